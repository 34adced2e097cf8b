//! Usage: Stable gateway error codes for classification and caller-side mapping.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    AuthExpired,
    AuthInvalid,
    UpstreamTimeout,
    UpstreamConnectFailed,
    UpstreamReadError,
    Upstream5xx,
    Upstream4xx,
    NoRefreshCredential,
    SessionDead,
    ResponseDecodeFailed,
    InvalidRequest,
}

impl GatewayErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthExpired => "GW_AUTH_EXPIRED",
            Self::AuthInvalid => "GW_AUTH_INVALID",
            Self::UpstreamTimeout => "GW_UPSTREAM_TIMEOUT",
            Self::UpstreamConnectFailed => "GW_UPSTREAM_CONNECT_FAILED",
            Self::UpstreamReadError => "GW_UPSTREAM_READ_ERROR",
            Self::Upstream5xx => "GW_UPSTREAM_5XX",
            Self::Upstream4xx => "GW_UPSTREAM_4XX",
            Self::NoRefreshCredential => "GW_NO_REFRESH_CREDENTIAL",
            Self::SessionDead => "GW_SESSION_DEAD",
            Self::ResponseDecodeFailed => "GW_RESPONSE_DECODE_FAILED",
            Self::InvalidRequest => "GW_INVALID_REQUEST",
        }
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
