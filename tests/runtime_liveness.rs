mod support;

use dashboard_session::infra::credential_store::MemoryBackend;
use dashboard_session::test_support::RecordingNavigator;
use dashboard_session::{ActivityEvent, IdleCheck, SessionRuntime, SessionSettings};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{closed_port_url, MockBackend, GOOD_PASSWORD};

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    done()
}

#[tokio::test]
async fn runtime_pings_the_health_endpoint_on_start() {
    let backend = MockBackend::start().await;
    let settings = SessionSettings {
        api_base_url: backend.base_url(),
        ..SessionSettings::default()
    };
    let navigator = Arc::new(RecordingNavigator::at("/"));

    let runtime =
        SessionRuntime::init(settings, MemoryBackend::default(), navigator).expect("init");

    assert!(wait_until(|| runtime.pinger().stats().succeeded == 1).await);
    assert_eq!(backend.state.health_calls.load(Ordering::SeqCst), 1);
    assert!(runtime.pinger().is_running());

    runtime
        .gateway()
        .login("ada@example.test", GOOD_PASSWORD)
        .await
        .expect("login");
    assert_eq!(
        runtime.on_user_activity(ActivityEvent::MouseMove),
        IdleCheck::Active
    );

    runtime.teardown();
    assert!(!runtime.pinger().is_running());
}

#[tokio::test]
async fn unreachable_health_endpoint_is_counted_not_escalated() {
    let base = closed_port_url().await;
    let settings = SessionSettings {
        api_base_url: base,
        ..SessionSettings::default()
    };
    let runtime = SessionRuntime::builder(settings)
        .backend(MemoryBackend::default())
        .build()
        .expect("build");

    assert!(runtime.pinger().ping_now());
    assert!(wait_until(|| runtime.pinger().stats().failed == 1).await);
    assert_eq!(runtime.tracker().count(), 0);
    runtime.teardown();
}
