//! Usage: Session value types (credential pair, cached identity) and auth wire payloads.

use crate::shared::security::mask_token;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque bearer credentials. Never parsed; `Debug` masks both values.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user: SessionUser,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenPayload {
    pub(crate) token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokensPayload {
    pub(crate) access: TokenPayload,
    pub(crate) refresh: TokenPayload,
}

impl TokensPayload {
    pub(crate) fn into_pair(self) -> Option<CredentialPair> {
        let access = self.access.token.trim();
        let refresh = self.refresh.token.trim();
        if access.is_empty() || refresh.is_empty() {
            return None;
        }
        Some(CredentialPair::new(access, refresh))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AuthPayload {
    pub(crate) user: SessionUser,
    pub(crate) tokens: TokensPayload,
}

/// Accepts `{access, refresh}` as returned by the refresh endpoint, or the wrapped
/// `{tokens: {access, refresh}}` shape used by login/register.
pub(crate) fn parse_token_pair(body: &Value) -> Option<CredentialPair> {
    let tokens = body.get("tokens").unwrap_or(body);
    serde_json::from_value::<TokensPayload>(tokens.clone())
        .ok()
        .and_then(TokensPayload::into_pair)
}

pub(crate) fn parse_auth_payload(body: &Value) -> Option<(CredentialPair, SessionIdentity)> {
    let payload: AuthPayload = serde_json::from_value(body.clone()).ok()?;
    let pair = payload.tokens.into_pair()?;
    Some((pair, SessionIdentity { user: payload.user }))
}
