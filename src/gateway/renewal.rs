//! Usage: Credential renewal (refresh-token exchange) and optional coalescing of concurrent renewals.

use super::error_code::GatewayErrorCode;
use super::errors::{ErrorKind, RequestError};
use super::request::parse_json_body;
use crate::domain::session::{parse_token_pair, CredentialPair};
use crate::infra::credential_store::CredentialStore;
use crate::infra::settings::SessionSettings;
use crate::shared::security::mask_token;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type RenewalFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CredentialPair, RequestError>> + Send + 'a>>;

/// The credential-issuing endpoint, seen from the gateway: refresh token in, fresh pair out.
///
/// Object-safe so hosts and tests can swap the transport.
pub trait CredentialRenewer: Send + Sync {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> RenewalFuture<'a>;
}

/// `POST {refresh path}` with `{"refreshToken": ...}` under its own short timeout.
#[derive(Debug, Clone)]
pub struct HttpRenewer {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRenewer {
    pub fn new(client: reqwest::Client, settings: &SessionSettings) -> Self {
        Self {
            client,
            url: settings.endpoint_url(&settings.auth_paths.refresh),
            timeout: settings.renewal_timeout(),
        }
    }

    async fn renew_over_http(&self, refresh_token: &str) -> Result<CredentialPair, RequestError> {
        let payload = serde_json::json!({ "refreshToken": refresh_token });
        let body = serde_json::to_vec(&payload).map_err(|e| {
            RequestError::new(
                ErrorKind::ClientRejected,
                GatewayErrorCode::InvalidRequest,
                format!("renewal payload encode failed: {e}"),
            )
        })?;

        let response = self
            .client
            .post(self.url.as_str())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| RequestError::from_transport(&e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RequestError::from_transport(&e))?;
        if !status.is_success() {
            return Err(RequestError::from_status(status, parse_json_body(&bytes)));
        }

        parse_json_body(&bytes)
            .as_ref()
            .and_then(parse_token_pair)
            .ok_or_else(|| {
                RequestError::new(
                    ErrorKind::Transient,
                    GatewayErrorCode::ResponseDecodeFailed,
                    format!(
                        "renewal response missing access/refresh tokens (status={})",
                        status.as_u16()
                    ),
                )
            })
    }
}

impl CredentialRenewer for HttpRenewer {
    fn renew<'a>(&'a self, refresh_token: &'a str) -> RenewalFuture<'a> {
        Box::pin(self.renew_over_http(refresh_token))
    }
}

pub(crate) struct RenewalCoordinator {
    renewer: Arc<dyn CredentialRenewer>,
    coalesce: bool,
    gate: tokio::sync::Mutex<()>,
    attempts: AtomicU64,
}

impl RenewalCoordinator {
    pub(crate) fn new(renewer: Arc<dyn CredentialRenewer>, coalesce: bool) -> Self {
        Self {
            renewer,
            coalesce,
            gate: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_renewer(&mut self, renewer: Arc<dyn CredentialRenewer>) {
        self.renewer = renewer;
    }

    pub(crate) fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Renews the stored pair after a 401 on a call sent with `sent_access`.
    ///
    /// With coalescing on, renewals serialize and a caller whose access token was already
    /// replaced by a peer reuses the new pair instead of spending the refresh token again.
    pub(crate) async fn renew(
        &self,
        store: &CredentialStore,
        sent_access: Option<&str>,
    ) -> Result<CredentialPair, RequestError> {
        if !self.coalesce {
            let refresh = store.refresh_token().ok_or_else(no_refresh_credential)?;
            return self.renew_and_store(store, &refresh).await;
        }

        let _gate = self.gate.lock().await;
        let current = store.read().ok_or_else(no_refresh_credential)?;
        if sent_access.is_some_and(|sent| sent != current.access_token) {
            tracing::debug!("credential already renewed by a concurrent call; reusing it");
            return Ok(current);
        }
        self.renew_and_store(store, &current.refresh_token).await
    }

    async fn renew_and_store(
        &self,
        store: &CredentialStore,
        refresh_token: &str,
    ) -> Result<CredentialPair, RequestError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            refresh_token = %mask_token(refresh_token),
            "access credential rejected; attempting renewal"
        );
        let pair = self.renewer.renew(refresh_token).await?;
        match store.replace_pair_if_current(refresh_token, &pair) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("session ended while renewing; discarding renewed credential");
                return Err(RequestError::new(
                    ErrorKind::SessionDead,
                    GatewayErrorCode::SessionDead,
                    "session ended while the credential was being renewed",
                ));
            }
            Err(err) => {
                tracing::warn!(error = %err, "renewed credential kept in memory only; persist failed");
            }
        }
        tracing::info!(access_token = %mask_token(&pair.access_token), "access credential renewed");
        Ok(pair)
    }
}

fn no_refresh_credential() -> RequestError {
    RequestError::new(
        ErrorKind::SessionDead,
        GatewayErrorCode::NoRefreshCredential,
        "no refresh credential stored",
    )
}
