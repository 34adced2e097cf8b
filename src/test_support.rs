//! Usage: Public test helpers for integration tests (fake host, manual clock, counting probe).

use crate::app::keep_alive::{HealthProbe, ProbeFuture};
use crate::domain::session::{SessionIdentity, SessionUser};
use crate::gateway::Navigator;
use crate::shared::error::AppError;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::Clock;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn sample_identity(user_id: &str) -> SessionIdentity {
    SessionIdentity {
        user: SessionUser {
            id: user_id.to_string(),
            name: format!("User {user_id}"),
            email: Some(format!("{user_id}@example.test")),
            role: "user".to_string(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    Login { return_to: Option<String> },
    Root,
}

/// Navigator that records every redirect and tracks the current route.
#[derive(Debug)]
pub struct RecordingNavigator {
    route: Mutex<String>,
    events: Mutex<Vec<NavEvent>>,
}

impl RecordingNavigator {
    pub fn at(route: &str) -> Self {
        Self {
            route: Mutex::new(route.to_string()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn set_route(&self, route: &str) {
        *self.route.lock_or_recover() = route.to_string();
    }

    pub fn events(&self) -> Vec<NavEvent> {
        self.events.lock_or_recover().clone()
    }

    pub fn login_redirects(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, NavEvent::Login { .. }))
            .count()
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> String {
        self.route.lock_or_recover().clone()
    }

    fn redirect_to_login(&self, return_to: Option<String>) {
        self.events
            .lock_or_recover()
            .push(NavEvent::Login { return_to });
        *self.route.lock_or_recover() = "/login".to_string();
    }

    fn redirect_to_root(&self) {
        self.events.lock_or_recover().push(NavEvent::Root);
        *self.route.lock_or_recover() = "/".to_string();
    }
}

#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_unix_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_unix_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Health probe that counts calls and can be slowed down or made to fail.
#[derive(Debug, Default)]
pub struct CountingProbe {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CountingProbe {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HealthProbe for CountingProbe {
    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AppError::new("PING_FAILED", "backend unreachable"));
            }
            Ok::<(), AppError>(())
        })
    }
}
