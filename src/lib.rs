//! Resilient session and request layer for the messaging dashboard: credential storage,
//! authenticated requests with one-shot renewal, failure-burst invalidation, keep-alive
//! pings and idle detection.

pub mod app;
pub mod domain;
pub mod gateway;
pub mod infra;
pub mod shared;
pub mod test_support;

pub use app::idle_monitor::{ActivityEvent, IdleCheck, IdleMonitor};
pub use app::keep_alive::{HealthProbe, HttpHealthProbe, KeepAlivePinger, KeepAliveStats};
pub use app::logging::LoggingOptions;
pub use app::runtime::{SessionRuntime, SessionRuntimeBuilder};
pub use domain::session::{CredentialPair, SessionIdentity, SessionUser};
pub use gateway::{
    ErrorKind, FailureTracker, GatewayErrorCode, GatewayResponse, Navigator, RequestDescriptor,
    RequestError, SessionGateway, UserAction,
};
pub use infra::credential_store::{CredentialStore, JsonFileBackend, MemoryBackend, StorageBackend};
pub use infra::settings::SessionSettings;
pub use shared::error::{AppError, AppResult};
