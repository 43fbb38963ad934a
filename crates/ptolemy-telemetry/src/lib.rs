//! # Ptolemy Telemetry
//!
//! Logging setup for Ptolemy services. Every crate logs through `tracing`
//! with structured fields; this crate installs the subscriber.
//!
//! | Preset | Format | Level |
//! |--------|--------|-------|
//! | [`LogConfig::development`] | pretty | `debug` |
//! | [`LogConfig::production`] | JSON | `info` |

#![doc(html_root_url = "https://docs.rs/ptolemy-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
