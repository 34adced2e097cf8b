pub mod error;
pub(crate) mod mutex_ext;
pub(crate) mod security;
pub mod time;
