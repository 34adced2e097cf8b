mod support;

use dashboard_session::infra::settings::{self, API_URL_ENV};
use support::{env_lock, EnvRestore};

#[test]
fn missing_file_yields_defaults() {
    let _lock = env_lock();
    let mut env = EnvRestore::default();
    env.remove_var(API_URL_ENV);
    let dir = tempfile::tempdir().expect("tempdir");

    let loaded = settings::read(&dir.path().join("absent.toml")).expect("defaults");

    assert_eq!(loaded.failure_threshold, 3);
    assert_eq!(loaded.ping_interval_seconds, 300);
    assert_eq!(loaded.idle_timeout_seconds, 12 * 60 * 60);
    assert_eq!(
        loaded.resolved_health_check_url(),
        "http://localhost:8000/health-check"
    );
}

#[test]
fn file_values_are_clamped_and_env_overrides_base_url() {
    let _lock = env_lock();
    let mut env = EnvRestore::default();
    env.set_var(API_URL_ENV, "https://api.example.test/");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.toml");
    std::fs::write(
        &path,
        r#"
api_base_url = "http://ignored.test"
failure_threshold = 0
ping_interval_seconds = 1
coalesce_renewals = true

[auth_paths]
refresh = "/v2/auth/refresh"
"#,
    )
    .expect("write settings");

    let loaded = settings::read(&path).expect("read");

    assert_eq!(loaded.base_url(), "https://api.example.test");
    assert_eq!(loaded.failure_threshold, 3);
    assert_eq!(loaded.ping_interval_seconds, 10);
    assert!(loaded.coalesce_renewals);
    assert_eq!(
        loaded.endpoint_url(&loaded.auth_paths.refresh),
        "https://api.example.test/v2/auth/refresh"
    );
    assert_eq!(loaded.auth_paths.login, "/v1/auth/login");
}

#[test]
fn malformed_file_is_a_config_error() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.toml");
    std::fs::write(&path, "failure_threshold = \"three\"").expect("write settings");

    let err = settings::read(&path).expect_err("invalid");
    assert_eq!(err.code(), "CONFIG_INVALID");
}
