//! Usage: Decaying counter of consecutive critical failures (backend-down detector).
//!
//! One timeout or 5xx is normal on a cold backend. Only a burst inside the reset window
//! crosses the threshold that justifies invalidating the session.

use crate::shared::mutex_ext::MutexExt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct TrackerInner {
    count: u32,
    // Bumped on every record; a reset task only applies if it still owns the latest generation.
    generation: u64,
    reset_task: Option<JoinHandle<()>>,
}

impl TrackerInner {
    fn cancel_reset(&mut self) {
        if let Some(task) = self.reset_task.take() {
            task.abort();
        }
    }
}

#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    reset_window: Duration,
    inner: Arc<Mutex<TrackerInner>>,
}

impl FailureTracker {
    pub fn new(threshold: u32, reset_window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            reset_window,
            inner: Arc::new(Mutex::new(TrackerInner::default())),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn count(&self) -> u32 {
        self.inner.lock_or_recover().count
    }

    pub fn is_over_threshold(&self) -> bool {
        self.count() >= self.threshold
    }

    /// Increments and (re)arms the decay timer. Returns the new count.
    pub fn record_critical(&self) -> u32 {
        let mut inner = self.inner.lock_or_recover();
        inner.count = inner.count.saturating_add(1);
        inner.generation = inner.generation.wrapping_add(1);
        inner.cancel_reset();
        let generation = inner.generation;
        inner.reset_task = schedule_reset(Arc::downgrade(&self.inner), generation, self.reset_window);
        tracing::debug!(
            count = inner.count,
            threshold = self.threshold,
            "critical request failure recorded"
        );
        inner.count
    }

    pub fn record_non_critical(&self) {
        let mut inner = self.inner.lock_or_recover();
        inner.generation = inner.generation.wrapping_add(1);
        inner.cancel_reset();
        if inner.count > 0 {
            tracing::debug!(previous = inner.count, "critical failure streak cleared");
        }
        inner.count = 0;
    }

    /// Cancels the pending decay (teardown). The count itself is kept.
    pub fn shutdown(&self) {
        self.inner.lock_or_recover().cancel_reset();
    }
}

impl Drop for FailureTracker {
    fn drop(&mut self) {
        self.inner.lock_or_recover().cancel_reset();
    }
}

fn schedule_reset(
    inner: Weak<Mutex<TrackerInner>>,
    generation: u64,
    window: Duration,
) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("no tokio runtime; failure counter decay not scheduled");
        return None;
    };
    Some(handle.spawn(async move {
        tokio::time::sleep(window).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut guard = inner.lock_or_recover();
        if guard.generation != generation {
            return;
        }
        tracing::debug!(
            previous = guard.count,
            "critical failure streak decayed after quiet window"
        );
        guard.count = 0;
        guard.reset_task = None;
    }))
}
