//! Usage: Request gateway wrapping every outbound call with credential and failure policy.
//!
//! Per call: attach bearer -> send -> classify. A 401 on attempt 0 triggers one renewal and one
//! retry; a failed renewal, or a burst of critical failures while signed in, invalidates the
//! session. Login/register 401s are returned untouched.

use super::error_code::GatewayErrorCode;
use super::errors::{ErrorKind, RequestError};
use super::failure_tracker::FailureTracker;
use super::navigation::Navigator;
use super::renewal::{CredentialRenewer, HttpRenewer, RenewalCoordinator};
use super::request::{parse_json_body, GatewayResponse, RequestDescriptor};
use crate::domain::session::{parse_auth_payload, CredentialPair, SessionIdentity};
use crate::infra::credential_store::CredentialStore;
use crate::infra::settings::SessionSettings;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::{Clock, SystemClock};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

enum FailureDecision {
    Retry,
    Fail(RequestError),
}

pub struct SessionGateway {
    client: reqwest::Client,
    settings: Arc<SessionSettings>,
    store: Arc<CredentialStore>,
    tracker: Arc<FailureTracker>,
    navigator: Arc<dyn Navigator>,
    renewal: RenewalCoordinator,
    clock: Arc<dyn Clock>,
    // Latched by invalidation, re-armed when a new session is established.
    invalidated: AtomicBool,
    return_route: Mutex<Option<String>>,
}

impl SessionGateway {
    pub fn new(
        settings: Arc<SessionSettings>,
        store: Arc<CredentialStore>,
        tracker: Arc<FailureTracker>,
        navigator: Arc<dyn Navigator>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| format!("HTTP_CLIENT_INIT: failed to build http client: {e}"))?;
        let renewer: Arc<dyn CredentialRenewer> =
            Arc::new(HttpRenewer::new(client.clone(), &settings));
        let renewal = RenewalCoordinator::new(renewer, settings.coalesce_renewals);

        Ok(Self {
            client,
            settings,
            store,
            tracker,
            navigator,
            renewal,
            clock: Arc::new(SystemClock),
            invalidated: AtomicBool::new(false),
            return_route: Mutex::new(None),
        })
    }

    pub fn with_renewer(mut self, renewer: Arc<dyn CredentialRenewer>) -> Self {
        self.renewal.set_renewer(renewer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<FailureTracker> {
        &self.tracker
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn current_identity(&self) -> Option<SessionIdentity> {
        self.store.identity()
    }

    /// Number of renewal calls issued so far.
    pub fn renewal_attempts(&self) -> u64 {
        self.renewal.attempts()
    }

    pub async fn get(&self, path: &str) -> Result<GatewayResponse, RequestError> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<GatewayResponse, RequestError> {
        self.send(RequestDescriptor::post(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<GatewayResponse, RequestError> {
        self.send(RequestDescriptor::patch(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<GatewayResponse, RequestError> {
        self.send(RequestDescriptor::delete(path)).await
    }

    pub async fn send(&self, request: RequestDescriptor) -> Result<GatewayResponse, RequestError> {
        let issuing = self.settings.is_credential_issuing_path(request.path());
        let mut request = request;
        loop {
            let sent_access = self.store.access_token();
            let err = match self.dispatch(&request, sent_access.as_deref()).await {
                Ok(response) => {
                    if !issuing {
                        self.tracker.record_non_critical();
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let decision = if issuing {
                self.on_issuing_failure(&request, err)
            } else {
                self.on_failure(&request, err, sent_access.as_deref()).await
            };
            match decision {
                FailureDecision::Retry => request = request.next_attempt(),
                FailureDecision::Fail(err) => return Err(err),
            }
        }
    }

    async fn dispatch(
        &self,
        request: &RequestDescriptor,
        access_token: Option<&str>,
    ) -> Result<GatewayResponse, RequestError> {
        let url = self.settings.endpoint_url(request.path());
        let mut builder = self.client.request(request.method().clone(), url.as_str());
        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                RequestError::new(
                    ErrorKind::ClientRejected,
                    GatewayErrorCode::InvalidRequest,
                    format!("request body encode failed: {e}"),
                )
            })?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        tracing::debug!(
            method = %request.method(),
            path = request.path(),
            attempt = request.attempt(),
            "dispatching request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::from_transport(&e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RequestError::from_transport(&e))?;
        if status.is_success() {
            return Ok(GatewayResponse::new(status, body));
        }
        Err(RequestError::from_status(status, parse_json_body(&body)))
    }

    // Login/register never renew, never invalidate, never feed the tracker.
    fn on_issuing_failure(&self, request: &RequestDescriptor, err: RequestError) -> FailureDecision {
        tracing::debug!(
            path = request.path(),
            code = %err.code(),
            "credential-issuing call failed"
        );
        if err.kind() == ErrorKind::AuthExpired {
            return FailureDecision::Fail(err.with_kind(ErrorKind::AuthInvalid));
        }
        FailureDecision::Fail(err)
    }

    async fn on_failure(
        &self,
        request: &RequestDescriptor,
        err: RequestError,
        sent_access: Option<&str>,
    ) -> FailureDecision {
        match err.kind() {
            ErrorKind::AuthExpired if !request.is_retry() => {
                match self.renewal.renew(&self.store, sent_access).await {
                    Ok(_) => FailureDecision::Retry,
                    Err(renewal_err) => {
                        tracing::warn!(
                            path = request.path(),
                            renewal_code = %renewal_err.code(),
                            renewal_status = renewal_err.status().map(|s| s.as_u16()),
                            "credential renewal failed; invalidating session"
                        );
                        self.invalidate_session();
                        FailureDecision::Fail(err.with_kind(ErrorKind::SessionDead))
                    }
                }
            }
            ErrorKind::AuthExpired | ErrorKind::Transient => {
                self.record_critical_and_escalate(request, err)
            }
            ErrorKind::ClientRejected => {
                self.tracker.record_non_critical();
                FailureDecision::Fail(err)
            }
            ErrorKind::AuthInvalid | ErrorKind::SessionDead => FailureDecision::Fail(err),
        }
    }

    fn record_critical_and_escalate(
        &self,
        request: &RequestDescriptor,
        err: RequestError,
    ) -> FailureDecision {
        let count = self.tracker.record_critical();
        tracing::warn!(
            path = request.path(),
            attempt = request.attempt(),
            code = %err.code(),
            status = err.status().map(|s| s.as_u16()),
            consecutive = count,
            "critical request failure"
        );
        if self.tracker.is_over_threshold() && self.store.is_authenticated() {
            self.invalidate_session();
            return FailureDecision::Fail(err.with_kind(ErrorKind::SessionDead));
        }
        FailureDecision::Fail(err)
    }

    /// Clears credentials and asks the host to show login. The clear runs on every call; the
    /// redirect and the recorded return route are latched until the next session is
    /// established. Returns whether this call issued the redirect.
    pub fn invalidate_session(&self) -> bool {
        if let Err(err) = self.store.clear() {
            tracing::error!(error = %err, "failed to persist cleared session");
        }
        self.tracker.record_non_critical();

        if self.invalidated.swap(true, Ordering::SeqCst) {
            tracing::debug!("session already invalidated; credentials cleared, redirect skipped");
            return false;
        }

        let route = self.navigator.current_route();
        let return_to = (!self.settings.routes.is_auth_route(&route)).then_some(route);
        *self.return_route.lock_or_recover() = return_to.clone();

        tracing::warn!(return_to = ?return_to, "session invalidated; redirecting to login");
        self.navigator.redirect_to_login(return_to);
        true
    }

    /// Route recorded by the last invalidation, consumed after a successful login.
    pub fn take_return_route(&self) -> Option<String> {
        self.return_route.lock_or_recover().take()
    }

    pub fn establish_session(
        &self,
        pair: &CredentialPair,
        identity: &SessionIdentity,
    ) -> AppResult<()> {
        self.invalidated.store(false, Ordering::SeqCst);
        self.tracker.record_non_critical();
        self.store.save(pair, identity)?;
        self.store.touch_activity(self.clock.now_unix_millis())?;
        tracing::info!(user_id = %identity.user.id, "session established");
        Ok(())
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionIdentity, RequestError> {
        let path = self.settings.auth_paths.login.clone();
        let response = self
            .post(&path, json!({ "email": email, "password": password }))
            .await?;
        self.adopt_auth_response(&response)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionIdentity, RequestError> {
        let path = self.settings.auth_paths.register.clone();
        let response = self
            .post(
                &path,
                json!({ "name": name, "email": email, "password": password }),
            )
            .await?;
        self.adopt_auth_response(&response)
    }

    fn adopt_auth_response(
        &self,
        response: &GatewayResponse,
    ) -> Result<SessionIdentity, RequestError> {
        let body = response.json_value()?;
        let (pair, identity) = parse_auth_payload(&body).ok_or_else(|| {
            RequestError::new(
                ErrorKind::Transient,
                GatewayErrorCode::ResponseDecodeFailed,
                format!(
                    "auth response missing user or tokens (status={})",
                    response.status().as_u16()
                ),
            )
        })?;
        if let Err(err) = self.establish_session(&pair, &identity) {
            tracing::warn!(error = %err, "session kept in memory only; persist failed");
        }
        Ok(identity)
    }

    /// Best-effort server-side revoke, then local clear. No navigation.
    pub async fn logout(&self) -> AppResult<()> {
        if let Some(refresh) = self.store.refresh_token() {
            let request = RequestDescriptor::post(
                self.settings.auth_paths.logout.clone(),
                json!({ "refreshToken": refresh }),
            );
            let access = self.store.access_token();
            if let Err(err) = self.dispatch(&request, access.as_deref()).await {
                tracing::debug!(error = %err, "logout request failed; clearing locally anyway");
            }
        }
        self.return_route.lock_or_recover().take();
        self.store.clear()?;
        tracing::info!("signed out");
        Ok(())
    }
}

impl std::fmt::Debug for SessionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGateway")
            .field("api_base_url", &self.settings.base_url())
            .field("authenticated", &self.store.is_authenticated())
            .field("consecutive_failures", &self.tracker.count())
            .finish_non_exhaustive()
    }
}
