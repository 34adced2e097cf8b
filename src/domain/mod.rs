//! Usage: Domain value types shared by the gateway and the liveness keeper.

pub mod session;
