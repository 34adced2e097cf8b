//! Usage: Idle monitor. Sends a signed-in user back to the root screen after a long absence.
//!
//! Credentials are never cleared here; idleness is a navigation nudge, not a sign-out.

use crate::gateway::Navigator;
use crate::infra::credential_store::CredentialStore;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// User interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    MouseDown,
    MouseMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivityEvent {
    pub const ALL: [ActivityEvent; 6] = [
        ActivityEvent::MouseDown,
        ActivityEvent::MouseMove,
        ActivityEvent::KeyPress,
        ActivityEvent::Scroll,
        ActivityEvent::TouchStart,
        ActivityEvent::Click,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityEvent::MouseDown => "mousedown",
            ActivityEvent::MouseMove => "mousemove",
            ActivityEvent::KeyPress => "keypress",
            ActivityEvent::Scroll => "scroll",
            ActivityEvent::TouchStart => "touchstart",
            ActivityEvent::Click => "click",
        }
    }

    /// Maps a host event name; anything else does not count as activity.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleCheck {
    NoSession,
    /// No timestamp stored yet; it was set to now.
    Initialized,
    Active,
    AlreadyAtRoot,
    Redirected,
}

struct IdleState {
    store: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
    root_route: String,
}

impl IdleState {
    fn check(&self) -> IdleCheck {
        if !self.store.is_authenticated() {
            return IdleCheck::NoSession;
        }
        let now = self.clock.now_unix_millis();
        let Some(last) = self.store.last_activity_ms() else {
            self.touch(now);
            return IdleCheck::Initialized;
        };

        let idle_ms = now.saturating_sub(last);
        let threshold_ms = i64::try_from(self.idle_timeout.as_millis()).unwrap_or(i64::MAX);
        if idle_ms < threshold_ms {
            return IdleCheck::Active;
        }
        if self.navigator.current_route().trim() == self.root_route {
            return IdleCheck::AlreadyAtRoot;
        }

        tracing::info!(
            idle_minutes = idle_ms / 60_000,
            "user idle past threshold; returning to root"
        );
        self.navigator.redirect_to_root();
        self.touch(now);
        IdleCheck::Redirected
    }

    fn touch(&self, now_ms: i64) {
        if let Err(err) = self.store.touch_activity(now_ms) {
            tracing::warn!(error = %err, "failed to persist activity timestamp");
        }
    }
}

pub struct IdleMonitor {
    state: Arc<IdleState>,
    check_interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl IdleMonitor {
    pub fn new(
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        idle_timeout: Duration,
        check_interval: Duration,
        root_route: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(IdleState {
                store,
                navigator,
                clock,
                idle_timeout,
                root_route: root_route.into(),
            }),
            check_interval,
            ticker: Mutex::new(None),
        }
    }

    pub fn check_now(&self) -> IdleCheck {
        self.state.check()
    }

    /// Checks against the previous timestamp first, then records the interaction.
    pub fn on_user_activity(&self, event: ActivityEvent) -> IdleCheck {
        let outcome = self.state.check();
        if outcome != IdleCheck::NoSession {
            tracing::trace!(event = event.as_str(), "user activity");
            self.state.touch(self.state.clock.now_unix_millis());
        }
        outcome
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock_or_recover()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Runs one check immediately, then one per check interval. Idempotent.
    pub fn start(&self) -> bool {
        let mut ticker = self.ticker.lock_or_recover();
        if ticker.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("idle monitor not started: no tokio runtime");
            return false;
        };

        self.state.check();
        let state = Arc::clone(&self.state);
        let period = self.check_interval;
        *ticker = Some(handle.spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                state.check();
            }
        }));
        tracing::debug!(check_interval_s = period.as_secs(), "idle monitor started");
        true
    }

    pub fn stop(&self) -> bool {
        let Some(task) = self.ticker.lock_or_recover().take() else {
            return false;
        };
        task.abort();
        tracing::debug!("idle monitor stopped");
        true
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.ticker.lock_or_recover().take() {
            task.abort();
        }
    }
}
