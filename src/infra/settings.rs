//! Usage: Session layer settings (schema + TOML read helpers + sanitizing clamps).

use crate::shared::error::{io_err, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const API_URL_ENV: &str = "DASHBOARD_API_URL";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const HEALTH_CHECK_PATH: &str = "/health-check";

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u32 = 30;
pub const DEFAULT_RENEWAL_TIMEOUT_SECONDS: u32 = 10;
pub const DEFAULT_PING_TIMEOUT_SECONDS: u32 = 5;
pub const DEFAULT_PING_INTERVAL_SECONDS: u32 = 5 * 60;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_FAILURE_RESET_SECONDS: u32 = 60;
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u32 = 12 * 60 * 60;
pub const DEFAULT_IDLE_CHECK_INTERVAL_SECONDS: u32 = 60;
const MAX_REQUEST_TIMEOUT_SECONDS: u32 = 10 * 60;
const MAX_RENEWAL_TIMEOUT_SECONDS: u32 = 2 * 60;
const MAX_PING_TIMEOUT_SECONDS: u32 = 60;
const MIN_PING_INTERVAL_SECONDS: u32 = 10;
const MAX_PING_INTERVAL_SECONDS: u32 = 24 * 60 * 60;
const MAX_FAILURE_THRESHOLD: u32 = 50;
const MAX_FAILURE_RESET_SECONDS: u32 = 60 * 60;
const MAX_IDLE_TIMEOUT_SECONDS: u32 = 7 * 24 * 60 * 60;
const MAX_IDLE_CHECK_INTERVAL_SECONDS: u32 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPaths {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "/v1/auth/login".to_string(),
            register: "/v1/auth/register".to_string(),
            refresh: "/v1/auth/refresh-tokens".to_string(),
            logout: "/v1/auth/logout".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub root: String,
    pub login: String,
    pub register: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            login: "/login".to_string(),
            register: "/register".to_string(),
        }
    }
}

impl RouteSettings {
    pub fn is_auth_route(&self, route: &str) -> bool {
        let route = route.trim();
        route == self.login || route == self.register
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub api_base_url: String,
    // Empty means `{api_base_url}/health-check`.
    pub health_check_url: String,
    pub auth_paths: AuthPaths,
    pub routes: RouteSettings,
    pub request_timeout_seconds: u32,
    pub renewal_timeout_seconds: u32,
    pub ping_timeout_seconds: u32,
    pub ping_interval_seconds: u32,
    pub failure_threshold: u32,
    pub failure_reset_seconds: u32,
    pub idle_timeout_seconds: u32,
    pub idle_check_interval_seconds: u32,
    pub keep_alive_enabled: bool,
    pub coalesce_renewals: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            health_check_url: String::new(),
            auth_paths: AuthPaths::default(),
            routes: RouteSettings::default(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            renewal_timeout_seconds: DEFAULT_RENEWAL_TIMEOUT_SECONDS,
            ping_timeout_seconds: DEFAULT_PING_TIMEOUT_SECONDS,
            ping_interval_seconds: DEFAULT_PING_INTERVAL_SECONDS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_reset_seconds: DEFAULT_FAILURE_RESET_SECONDS,
            idle_timeout_seconds: DEFAULT_IDLE_TIMEOUT_SECONDS,
            idle_check_interval_seconds: DEFAULT_IDLE_CHECK_INTERVAL_SECONDS,
            keep_alive_enabled: true,
            coalesce_renewals: false,
        }
    }
}

impl SessionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.into())
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_seconds.into())
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_seconds.into())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds.into())
    }

    pub fn failure_reset_window(&self) -> Duration {
        Duration::from_secs(self.failure_reset_seconds.into())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds.into())
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_seconds.into())
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url())
        } else {
            format!("{}/{path}", self.base_url())
        }
    }

    pub fn resolved_health_check_url(&self) -> String {
        let explicit = self.health_check_url.trim();
        if explicit.is_empty() {
            self.endpoint_url(HEALTH_CHECK_PATH)
        } else {
            explicit.to_string()
        }
    }

    /// Credential-issuing endpoints whose 401s mean "bad credentials", not "expired session".
    pub fn is_credential_issuing_path(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path).trim();
        path.ends_with(self.auth_paths.login.as_str())
            || path.ends_with(self.auth_paths.register.as_str())
    }

    /// Returns the settings with out-of-range values replaced, plus whether anything changed.
    pub fn sanitized(mut self) -> (Self, bool) {
        let mut changed = false;
        changed |= sanitize_timeouts(&mut self);
        changed |= sanitize_failure_policy(&mut self);
        changed |= sanitize_liveness(&mut self);
        if self.api_base_url.trim().is_empty() {
            self.api_base_url = DEFAULT_API_BASE_URL.to_string();
            changed = true;
        }
        (self, changed)
    }
}

fn clamp_nonzero(value: &mut u32, default: u32, max: u32) -> bool {
    if *value == 0 {
        *value = default;
        return true;
    }
    if *value > max {
        *value = max;
        return true;
    }
    false
}

fn sanitize_timeouts(settings: &mut SessionSettings) -> bool {
    let mut changed = false;
    changed |= clamp_nonzero(
        &mut settings.request_timeout_seconds,
        DEFAULT_REQUEST_TIMEOUT_SECONDS,
        MAX_REQUEST_TIMEOUT_SECONDS,
    );
    changed |= clamp_nonzero(
        &mut settings.renewal_timeout_seconds,
        DEFAULT_RENEWAL_TIMEOUT_SECONDS,
        MAX_RENEWAL_TIMEOUT_SECONDS,
    );
    changed |= clamp_nonzero(
        &mut settings.ping_timeout_seconds,
        DEFAULT_PING_TIMEOUT_SECONDS,
        MAX_PING_TIMEOUT_SECONDS,
    );
    changed
}

fn sanitize_failure_policy(settings: &mut SessionSettings) -> bool {
    let mut changed = false;
    changed |= clamp_nonzero(
        &mut settings.failure_threshold,
        DEFAULT_FAILURE_THRESHOLD,
        MAX_FAILURE_THRESHOLD,
    );
    changed |= clamp_nonzero(
        &mut settings.failure_reset_seconds,
        DEFAULT_FAILURE_RESET_SECONDS,
        MAX_FAILURE_RESET_SECONDS,
    );
    changed
}

fn sanitize_liveness(settings: &mut SessionSettings) -> bool {
    let mut changed = false;
    changed |= clamp_nonzero(
        &mut settings.ping_interval_seconds,
        DEFAULT_PING_INTERVAL_SECONDS,
        MAX_PING_INTERVAL_SECONDS,
    );
    if settings.ping_interval_seconds < MIN_PING_INTERVAL_SECONDS {
        settings.ping_interval_seconds = MIN_PING_INTERVAL_SECONDS;
        changed = true;
    }
    changed |= clamp_nonzero(
        &mut settings.idle_timeout_seconds,
        DEFAULT_IDLE_TIMEOUT_SECONDS,
        MAX_IDLE_TIMEOUT_SECONDS,
    );
    changed |= clamp_nonzero(
        &mut settings.idle_check_interval_seconds,
        DEFAULT_IDLE_CHECK_INTERVAL_SECONDS,
        MAX_IDLE_CHECK_INTERVAL_SECONDS,
    );
    changed
}

pub fn parse_toml(content: &str) -> AppResult<SessionSettings> {
    let parsed: SessionSettings = toml::from_str(content)
        .map_err(|e| format!("CONFIG_INVALID: failed to parse session settings: {e}"))?;
    let (settings, changed) = parsed.sanitized();
    if changed {
        tracing::warn!("session settings contained out-of-range values; clamped to safe limits");
    }
    Ok(settings)
}

/// Reads settings from `path` (defaults when the file is absent) and applies the env override.
pub fn read(path: &Path) -> AppResult<SessionSettings> {
    let mut settings = match std::fs::read_to_string(path) {
        Ok(content) => parse_toml(&content)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "session settings file absent; using defaults");
            SessionSettings::default()
        }
        Err(err) => return Err(io_err("read session settings", err)),
    };

    if let Some(url) = std::env::var(API_URL_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        tracing::info!(api_base_url = %url, "api base url overridden from environment");
        settings.api_base_url = url;
    }

    Ok(settings)
}
