//! Usage: Infrastructure (settings file, persisted session state).

pub mod credential_store;
pub mod settings;
