//! Usage: Explicit context that owns every piece of shared session state.
//!
//! Built once at app start; `teardown()` stops the background tickers on unmount.

use super::idle_monitor::{ActivityEvent, IdleCheck, IdleMonitor};
use super::keep_alive::{HealthProbe, HttpHealthProbe, KeepAlivePinger};
use crate::gateway::{CredentialRenewer, FailureTracker, Navigator, NoopNavigator, SessionGateway};
use crate::infra::credential_store::{CredentialStore, StorageBackend};
use crate::infra::settings::SessionSettings;
use crate::shared::error::AppResult;
use crate::shared::time::{Clock, SystemClock};
use std::sync::Arc;

pub struct SessionRuntimeBuilder {
    settings: SessionSettings,
    store: Option<Arc<CredentialStore>>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    probe: Option<Arc<dyn HealthProbe>>,
    renewer: Option<Arc<dyn CredentialRenewer>>,
}

impl SessionRuntimeBuilder {
    pub fn backend(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.store = Some(Arc::new(CredentialStore::open(backend)));
        self
    }

    pub fn store(mut self, store: Arc<CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn renewer(mut self, renewer: Arc<dyn CredentialRenewer>) -> Self {
        self.renewer = Some(renewer);
        self
    }

    pub fn build(self) -> AppResult<SessionRuntime> {
        let (settings, clamped) = self.settings.sanitized();
        if clamped {
            tracing::warn!("session settings out of range; clamped to safe values");
        }
        let settings = Arc::new(settings);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(CredentialStore::in_memory()));
        let tracker = Arc::new(FailureTracker::new(
            settings.failure_threshold,
            settings.failure_reset_window(),
        ));

        let mut gateway = SessionGateway::new(
            Arc::clone(&settings),
            Arc::clone(&store),
            Arc::clone(&tracker),
            Arc::clone(&self.navigator),
        )?
        .with_clock(Arc::clone(&self.clock));
        if let Some(renewer) = self.renewer {
            gateway = gateway.with_renewer(renewer);
        }

        let probe = match self.probe {
            Some(probe) => probe,
            None => {
                let client = reqwest::Client::builder().build().map_err(|e| {
                    format!("HTTP_CLIENT_INIT: failed to build health check client: {e}")
                })?;
                Arc::new(HttpHealthProbe::new(
                    client,
                    settings.resolved_health_check_url(),
                ))
            }
        };
        let pinger = KeepAlivePinger::new(probe, settings.ping_interval(), settings.ping_timeout());
        let idle = IdleMonitor::new(
            Arc::clone(&store),
            self.navigator,
            Arc::clone(&self.clock),
            settings.idle_timeout(),
            settings.idle_check_interval(),
            settings.routes.root.clone(),
        );

        Ok(SessionRuntime {
            settings,
            store,
            tracker,
            gateway: Arc::new(gateway),
            pinger,
            idle,
            clock: self.clock,
        })
    }
}

pub struct SessionRuntime {
    settings: Arc<SessionSettings>,
    store: Arc<CredentialStore>,
    tracker: Arc<FailureTracker>,
    gateway: Arc<SessionGateway>,
    pinger: KeepAlivePinger,
    idle: IdleMonitor,
    clock: Arc<dyn Clock>,
}

impl SessionRuntime {
    pub fn builder(settings: SessionSettings) -> SessionRuntimeBuilder {
        SessionRuntimeBuilder {
            settings,
            store: None,
            navigator: Arc::new(NoopNavigator),
            clock: Arc::new(SystemClock),
            probe: None,
            renewer: None,
        }
    }

    /// Builds the runtime and starts its background work. Must run inside a tokio runtime.
    pub fn init(
        settings: SessionSettings,
        backend: impl StorageBackend + 'static,
        navigator: Arc<dyn Navigator>,
    ) -> AppResult<Self> {
        let runtime = Self::builder(settings)
            .backend(backend)
            .navigator(navigator)
            .build()?;
        runtime.start();
        Ok(runtime)
    }

    /// Starts keep-alive (when enabled) and the idle monitor. Safe to call repeatedly.
    pub fn start(&self) {
        if self.settings.keep_alive_enabled {
            self.pinger.start();
        }
        // Idle check runs against the stored timestamp before startup refreshes it.
        self.idle.start();
        if self.store.is_authenticated() {
            if let Err(err) = self.store.touch_activity(self.clock.now_unix_millis()) {
                tracing::warn!(error = %err, "failed to persist activity timestamp");
            }
        }
        tracing::info!(
            api_base_url = self.settings.base_url(),
            authenticated = self.store.is_authenticated(),
            keep_alive = self.settings.keep_alive_enabled,
            "session runtime started"
        );
    }

    pub fn teardown(&self) {
        self.pinger.stop();
        self.idle.stop();
        self.tracker.shutdown();
        tracing::info!("session runtime stopped");
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

    pub fn gateway(&self) -> &Arc<SessionGateway> {
        &self.gateway
    }

    pub fn pinger(&self) -> &KeepAlivePinger {
        &self.pinger
    }

    pub fn idle_monitor(&self) -> &IdleMonitor {
        &self.idle
    }

    pub fn on_user_activity(&self, event: ActivityEvent) -> IdleCheck {
        self.idle.on_user_activity(event)
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        self.tracker.shutdown();
    }
}
