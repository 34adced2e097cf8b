//! Usage: Keep-alive pinger that keeps a sleeping backend warm.
//!
//! Contract:
//! - `start()` fires one ping immediately, then one per interval until `stop()`.
//! - At most one ping in flight; a tick that finds one outstanding is skipped, not queued.
//! - Every failure is swallowed (counted + debug log). Pings never touch the failure tracker.

use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use reqwest::header::CACHE_CONTROL;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = AppResult<()>> + Send + 'a>>;

pub trait HealthProbe: Send + Sync {
    fn probe(&self) -> ProbeFuture<'_>;
}

/// `GET` on the health endpoint. Any HTTP response counts as awake.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl HealthProbe for HttpHealthProbe {
    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url.as_str())
                .header(CACHE_CONTROL, "no-cache")
                .send()
                .await
                .map_err(|e| format!("PING_FAILED: health check request failed: {e}"))?;
            tracing::trace!(status = response.status().as_u16(), "health check answered");
            Ok::<(), AppError>(())
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveStats {
    pub sent: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct PingerShared {
    pinging: AtomicBool,
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

pub struct KeepAlivePinger {
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    ping_timeout: Duration,
    shared: Arc<PingerShared>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl KeepAlivePinger {
    pub fn new(probe: Arc<dyn HealthProbe>, interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            probe,
            interval,
            ping_timeout,
            shared: Arc::new(PingerShared::default()),
            ticker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock_or_recover()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn stats(&self) -> KeepAliveStats {
        KeepAliveStats {
            sent: self.shared.sent.load(Ordering::Relaxed),
            succeeded: self.shared.succeeded.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
        }
    }

    /// Returns `false` when a ticker is already running (or no runtime is available).
    pub fn start(&self) -> bool {
        let mut ticker = self.ticker.lock_or_recover();
        if ticker.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("keep-alive not started: no tokio runtime");
            return false;
        };

        let probe = Arc::clone(&self.probe);
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let ping_timeout = self.ping_timeout;
        *ticker = Some(handle.spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // First tick completes immediately: that is the wake-up ping.
                ticks.tick().await;
                fire(&probe, &shared, ping_timeout);
            }
        }));

        tracing::info!(interval_s = interval.as_secs(), "keep-alive pinger started");
        true
    }

    pub fn stop(&self) -> bool {
        let Some(task) = self.ticker.lock_or_recover().take() else {
            return false;
        };
        task.abort();
        tracing::info!("keep-alive pinger stopped");
        true
    }

    /// Out-of-band ping (e.g. right after login). Returns whether a ping was launched.
    pub fn ping_now(&self) -> bool {
        fire(&self.probe, &self.shared, self.ping_timeout)
    }
}

impl Drop for KeepAlivePinger {
    fn drop(&mut self) {
        if let Some(task) = self.ticker.lock_or_recover().take() {
            task.abort();
        }
    }
}

fn fire(probe: &Arc<dyn HealthProbe>, shared: &Arc<PingerShared>, ping_timeout: Duration) -> bool {
    if shared
        .pinging
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        shared.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("keep-alive ping still in flight; skipping tick");
        return false;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        shared.pinging.store(false, Ordering::Release);
        return false;
    };

    let probe = Arc::clone(probe);
    let shared = Arc::clone(shared);
    handle.spawn(async move {
        shared.sent.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(ping_timeout, probe.probe()).await {
            Ok(Ok(())) => {
                shared.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %err, "keep-alive ping failed (ignored)");
            }
            Err(_) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    timeout_s = ping_timeout.as_secs(),
                    "keep-alive ping timed out (ignored)"
                );
            }
        }
        shared.pinging.store(false, Ordering::Release);
    });
    true
}
