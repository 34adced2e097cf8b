//! Usage: Request error taxonomy, outcome classification, and user-facing messages.

use super::error_code::GatewayErrorCode;
use reqwest::StatusCode;
use serde_json::Value;

/// How a failed call should be treated by the gateway and shown by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401 on a session call; recoverable by one renewal.
    AuthExpired,
    /// 401 on login/register; wrong credentials, surfaced as-is.
    AuthInvalid,
    /// Timeout, network error or 5xx; counted toward invalidation.
    Transient,
    /// 4xx other than 401; a valid rejection, never counted.
    ClientRejected,
    /// Renewal failed or too many transient failures; the session was invalidated.
    SessionDead,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::AuthInvalid => "auth_invalid",
            Self::Transient => "transient",
            Self::ClientRejected => "client_rejected",
            Self::SessionDead => "session_dead",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Keep the screen, offer a retry button.
    ManualRetry,
    /// Navigation already happened; nothing to offer.
    Redirect,
    /// Show the message next to the form, no navigation.
    Inline,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RequestError {
    kind: ErrorKind,
    code: GatewayErrorCode,
    status: Option<StatusCode>,
    message: String,
    body: Option<Value>,
}

impl RequestError {
    pub fn new(kind: ErrorKind, code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            status: None,
            message: message.into(),
            body: None,
        }
    }

    pub fn from_status(status: StatusCode, body: Option<Value>) -> Self {
        let (kind, code) = classify_status(status);
        let message = body
            .as_ref()
            .and_then(server_message)
            .unwrap_or_else(|| format!("upstream returned status={}", status.as_u16()));
        Self {
            kind,
            code,
            status: Some(status),
            message,
            body,
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        let (kind, code) = classify_reqwest_error(err);
        Self::new(kind, code, err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> GatewayErrorCode {
        self.code
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED)
    }

    /// Re-kinds the error. Status and body stay; the code follows kinds that have their own.
    pub(crate) fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        match kind {
            ErrorKind::AuthInvalid => self.code = GatewayErrorCode::AuthInvalid,
            ErrorKind::SessionDead => self.code = GatewayErrorCode::SessionDead,
            ErrorKind::AuthExpired | ErrorKind::Transient | ErrorKind::ClientRejected => {}
        }
        self
    }

    /// Network error, timeout, 5xx or 429: worth offering a retry.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => !matches!(
                self.code,
                GatewayErrorCode::InvalidRequest | GatewayErrorCode::NoRefreshCredential
            ),
            Some(status) => {
                status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }

    pub fn user_action(&self) -> UserAction {
        match self.kind {
            ErrorKind::SessionDead => UserAction::Redirect,
            ErrorKind::Transient => UserAction::ManualRetry,
            ErrorKind::AuthExpired | ErrorKind::AuthInvalid | ErrorKind::ClientRejected => {
                UserAction::Inline
            }
        }
    }

    pub fn user_message(&self) -> String {
        if let Some(status) = self.status {
            return match status.as_u16() {
                401 if self.kind == ErrorKind::AuthInvalid => self
                    .body
                    .as_ref()
                    .and_then(server_message)
                    .unwrap_or_else(|| "Invalid email or password.".to_string()),
                401 => "Session expired. Please login again.".to_string(),
                403 => "You do not have permission to perform this action.".to_string(),
                404 => "The requested resource was not found.".to_string(),
                429 => "Too many requests. Please try again later.".to_string(),
                500 | 502 | 503 | 504 => "Server error. Please try again in a moment.".to_string(),
                code => self
                    .body
                    .as_ref()
                    .and_then(server_message)
                    .unwrap_or_else(|| format!("Server error ({code}). Please try again.")),
            };
        }

        match self.code {
            GatewayErrorCode::UpstreamTimeout => {
                "Request timed out. Please check your connection and try again.".to_string()
            }
            GatewayErrorCode::UpstreamConnectFailed | GatewayErrorCode::UpstreamReadError => {
                "Network error. Please check your internet connection.".to_string()
            }
            GatewayErrorCode::NoRefreshCredential | GatewayErrorCode::SessionDead => {
                "Session expired. Please login again.".to_string()
            }
            _ if !self.message.trim().is_empty() => self.message.clone(),
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

pub(crate) fn classify_status(status: StatusCode) -> (ErrorKind, GatewayErrorCode) {
    if status == StatusCode::UNAUTHORIZED {
        return (ErrorKind::AuthExpired, GatewayErrorCode::AuthExpired);
    }
    if status.is_server_error() {
        return (ErrorKind::Transient, GatewayErrorCode::Upstream5xx);
    }
    (ErrorKind::ClientRejected, GatewayErrorCode::Upstream4xx)
}

pub(crate) fn classify_reqwest_error(err: &reqwest::Error) -> (ErrorKind, GatewayErrorCode) {
    if err.is_timeout() {
        return (ErrorKind::Transient, GatewayErrorCode::UpstreamTimeout);
    }
    if err.is_connect() {
        return (ErrorKind::Transient, GatewayErrorCode::UpstreamConnectFailed);
    }
    if err.is_builder() {
        return (ErrorKind::ClientRejected, GatewayErrorCode::InvalidRequest);
    }
    (ErrorKind::Transient, GatewayErrorCode::UpstreamReadError)
}

/// `{"error": {"message"}}`, `{"message"}` or FastAPI's `{"detail": "..."}`.
fn server_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .or_else(|| body.get("detail").and_then(Value::as_str))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().take(240).collect())
}
