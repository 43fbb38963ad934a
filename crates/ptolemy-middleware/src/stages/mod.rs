//! Built-in stages.

pub mod access_log;
pub mod auth;
pub mod request_id;
