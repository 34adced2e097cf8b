#![allow(dead_code)]

use std::collections::HashSet;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashboard_session::test_support::RecordingNavigator;
use dashboard_session::{
    CredentialPair, CredentialStore, FailureTracker, SessionGateway, SessionSettings,
};
use serde_json::{json, Value};

pub const ACCOUNTS_PATH: &str = "/v1/accounts";
pub const FLAKY_PATH: &str = "/v1/flaky";
pub const GOOD_PASSWORD: &str = "correct horse";

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn save_once(&mut self, key: &'static str) {
        if self.saved.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.saved.push((key, std::env::var_os(key)));
    }

    pub fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    pub fn remove_var(&mut self, key: &'static str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[derive(Default)]
pub struct MockState {
    valid_access: Mutex<HashSet<String>>,
    valid_refresh: Mutex<HashSet<String>>,
    issued: AtomicU64,
    refresh_enabled: AtomicBool,
    refresh_issues_stale_access: AtomicBool,
    refresh_delay_ms: AtomicU64,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub account_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
}

impl MockState {
    fn issue_pair(&self) -> CredentialPair {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let pair = CredentialPair::new(format!("access-{n}"), format!("refresh-{n}"));
        lock(&self.valid_access).insert(pair.access_token.clone());
        lock(&self.valid_refresh).insert(pair.refresh_token.clone());
        pair
    }

    fn access_ok(&self, headers: &HeaderMap) -> bool {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| lock(&self.valid_access).contains(token))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn tokens_json(pair: &CredentialPair) -> Value {
    json!({
        "access": { "token": pair.access_token, "expires": "2030-01-01T00:00:00.000Z" },
        "refresh": { "token": pair.refresh_token, "expires": "2030-02-01T00:00:00.000Z" }
    })
}

fn user_json(email: &str) -> Value {
    json!({ "id": "u-1", "name": "Ada Lovelace", "email": email, "role": "admin" })
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["password"].as_str() != Some(GOOD_PASSWORD) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": 401, "message": "Incorrect email or password" })),
        )
            .into_response();
    }
    let pair = state.issue_pair();
    let email = body["email"].as_str().unwrap_or_default();
    Json(json!({ "user": user_json(email), "tokens": tokens_json(&pair) })).into_response()
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let pair = state.issue_pair();
    let email = body["email"].as_str().unwrap_or_default();
    (
        StatusCode::CREATED,
        Json(json!({ "user": user_json(email), "tokens": tokens_json(&pair) })),
    )
        .into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let presented = body["refreshToken"].as_str().unwrap_or_default().to_string();
    let known = lock(&state.valid_refresh).remove(&presented);
    if !state.refresh_enabled.load(Ordering::SeqCst) || !known {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": 401, "message": "Please authenticate" })),
        )
            .into_response();
    }
    let pair = state.issue_pair();
    if state.refresh_issues_stale_access.load(Ordering::SeqCst) {
        lock(&state.valid_access).remove(&pair.access_token);
    }
    // Backend answers with the bare {access, refresh} shape.
    Json(tokens_json(&pair)).into_response()
}

async fn logout(State(state): State<Arc<MockState>>) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn accounts(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.account_calls.fetch_add(1, Ordering::SeqCst);
    if !state.access_ok(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": 401, "message": "Please authenticate" })),
        )
            .into_response();
    }
    Json(json!({ "results": [{ "id": "acc-1", "platform": "whatsapp" }], "totalResults": 1 }))
        .into_response()
}

async fn flaky() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "message": "warming up" })),
    )
        .into_response()
}

async fn health(State(state): State<Arc<MockState>>) -> StatusCode {
    state.health_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

/// Scripted backend on an ephemeral port.
pub struct MockBackend {
    addr: SocketAddr,
    pub state: Arc<MockState>,
    server: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        state.refresh_enabled.store(true, Ordering::SeqCst);

        let app = Router::new()
            .route("/v1/auth/login", post(login))
            .route("/v1/auth/register", post(register))
            .route("/v1/auth/refresh-tokens", post(refresh))
            .route("/v1/auth/logout", post(logout))
            .route(ACCOUNTS_PATH, get(accounts))
            .route(FLAKY_PATH, get(flaky))
            .route("/health-check", get(health))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock backend");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A pair the backend accepts, as if issued by an earlier login.
    pub fn issue_pair(&self) -> CredentialPair {
        self.state.issue_pair()
    }

    /// Every outstanding access token starts answering 401.
    pub fn expire_access_tokens(&self) {
        lock(&self.state.valid_access).clear();
    }

    pub fn reject_refresh(&self) {
        self.state.refresh_enabled.store(false, Ordering::SeqCst);
    }

    /// Renewal still succeeds, but the access token it hands out is already rejected.
    pub fn renew_with_stale_access(&self) {
        self.state
            .refresh_issues_stale_access
            .store(true, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.refresh_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn account_calls(&self) -> usize {
        self.state.account_calls.load(Ordering::SeqCst)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Base URL of a port nothing listens on (connection refused).
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("free port addr");
    drop(listener);
    format!("http://{addr}")
}

pub struct Harness {
    pub gateway: Arc<SessionGateway>,
    pub store: Arc<CredentialStore>,
    pub tracker: Arc<FailureTracker>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn harness(base_url: &str, route: &str, tweak: impl FnOnce(&mut SessionSettings)) -> Harness {
    let mut settings = SessionSettings {
        api_base_url: base_url.to_string(),
        request_timeout_seconds: 5,
        renewal_timeout_seconds: 5,
        ..SessionSettings::default()
    };
    tweak(&mut settings);
    let settings = Arc::new(settings);
    let store = Arc::new(CredentialStore::in_memory());
    let tracker = Arc::new(FailureTracker::new(
        settings.failure_threshold,
        settings.failure_reset_window(),
    ));
    let navigator = Arc::new(RecordingNavigator::at(route));
    let gateway = SessionGateway::new(
        settings,
        Arc::clone(&store),
        Arc::clone(&tracker),
        navigator.clone(),
    )
    .expect("gateway");

    Harness {
        gateway: Arc::new(gateway),
        store,
        tracker,
        navigator,
    }
}
