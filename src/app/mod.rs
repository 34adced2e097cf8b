//! Usage: Application-level wiring (logging, liveness keeper, runtime context).

pub mod idle_monitor;
pub mod keep_alive;
pub mod logging;
pub mod runtime;
