//! Usage: Request gateway (credential injection, renewal, failure policy, invalidation).

mod client;
pub mod error_code;
pub mod errors;
pub mod failure_tracker;
pub mod navigation;
pub mod renewal;
pub mod request;

pub use client::SessionGateway;
pub use error_code::GatewayErrorCode;
pub use errors::{ErrorKind, RequestError, UserAction};
pub use failure_tracker::FailureTracker;
pub use navigation::{Navigator, NoopNavigator};
pub use renewal::{CredentialRenewer, HttpRenewer, RenewalFuture};
pub use request::{GatewayResponse, RequestDescriptor};
