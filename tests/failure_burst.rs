mod support;

use dashboard_session::test_support::{sample_identity, NavEvent};
use dashboard_session::{CredentialPair, ErrorKind, GatewayErrorCode, UserAction};
use std::time::Duration;
use support::{closed_port_url, harness, MockBackend, ACCOUNTS_PATH, FLAKY_PATH};

#[tokio::test]
async fn network_error_burst_invalidates_the_session() {
    let base = closed_port_url().await;
    let h = harness(&base, "/accounts", |_| {});
    h.gateway
        .establish_session(&CredentialPair::new("a-1", "r-1"), &sample_identity("u-1"))
        .expect("establish");

    for expected_count in 1..=2 {
        let err = h.gateway.get(ACCOUNTS_PATH).await.expect_err("refused");
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.code(), GatewayErrorCode::UpstreamConnectFailed);
        assert_eq!(err.user_action(), UserAction::ManualRetry);
        assert!(err.is_retryable());
        assert_eq!(h.tracker.count(), expected_count);
        assert!(h.gateway.is_authenticated());
    }

    let err = h.gateway.get(ACCOUNTS_PATH).await.expect_err("third refusal");

    assert_eq!(err.kind(), ErrorKind::SessionDead);
    assert!(h.store.read().is_none());
    assert_eq!(
        h.navigator.events(),
        vec![NavEvent::Login {
            return_to: Some("/accounts".to_string())
        }]
    );
    assert_eq!(h.tracker.count(), 0);
}

#[tokio::test]
async fn burst_without_a_session_only_reports_errors() {
    let base = closed_port_url().await;
    let h = harness(&base, "/", |_| {});

    for _ in 0..4 {
        let err = h.gateway.get(ACCOUNTS_PATH).await.expect_err("refused");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    assert!(h.tracker.is_over_threshold());
    assert!(h.navigator.events().is_empty());
}

#[tokio::test]
async fn success_between_failures_resets_the_count() {
    let backend = MockBackend::start().await;
    let h = harness(&backend.base_url(), "/inbox", |_| {});
    h.gateway
        .establish_session(&backend.issue_pair(), &sample_identity("u-1"))
        .expect("establish");

    for _ in 0..2 {
        let err = h.gateway.get(FLAKY_PATH).await.expect_err("503");
        assert_eq!(err.code(), GatewayErrorCode::Upstream5xx);
    }
    h.gateway.get(ACCOUNTS_PATH).await.expect("healthy call");
    assert_eq!(h.tracker.count(), 0);

    for _ in 0..2 {
        h.gateway.get(FLAKY_PATH).await.expect_err("503");
    }
    assert!(h.gateway.is_authenticated());
    assert!(h.navigator.events().is_empty());
}

#[tokio::test]
async fn failures_spread_past_the_window_do_not_escalate() {
    let backend = MockBackend::start().await;
    let h = harness(&backend.base_url(), "/inbox", |s| s.failure_reset_seconds = 1);
    h.gateway
        .establish_session(&backend.issue_pair(), &sample_identity("u-1"))
        .expect("establish");

    for _ in 0..2 {
        h.gateway.get(FLAKY_PATH).await.expect_err("503");
    }
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert_eq!(h.tracker.count(), 0);

    for _ in 0..2 {
        let err = h.gateway.get(FLAKY_PATH).await.expect_err("503");
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
    assert!(!h.tracker.is_over_threshold());
    assert!(h.gateway.is_authenticated());
}
