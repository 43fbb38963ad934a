//! # Ptolemy Config
//!
//! Strictly typed configuration for Ptolemy services.
//!
//! | Section | Type | Controls |
//! |---------|------|----------|
//! | `[server]` | [`ServerSection`] | bind address, port, timeouts, body limit |
//! | `[apis]` | [`ApisSection`] | document directory, ignored APIs, builtin `ping`, artifact cache |
//! | `[codec]` | [`CodecSection`] | unknown-field policy, timestamp format |
//! | `[reporting]` | [`ReportingSection`] | crash reports, slow-call threshold |
//! | `[logging]` | [`LoggingSection`] | filter directives, json or pretty |
//!
//! Unknown fields fail at load time, in files and in
//! `PTOLEMY__SECTION__KEY` overrides alike.
//!
//! ## Example
//!
//! ```
//! use ptolemy_config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_string(r#"
//!         [apis]
//!         path = "services"
//!         ignore = ["legacy"]
//!
//!         [reporting]
//!         slow_call_ms = 250
//!     "#, "toml")
//!     .unwrap()
//!     .load()
//!     .unwrap();
//!
//! assert_eq!(config.apis.ignore, vec!["legacy"]);
//! assert_eq!(config.slow_call().unwrap().as_millis(), 250);
//! ```

#![doc(html_root_url = "https://docs.rs/ptolemy-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{PtolemyConfig, DEFAULT_PORT, PORT_ENV};
pub use error::ConfigError;
pub use loader::{variant_path, ConfigLoader, ENV_NAME_VAR, ENV_PREFIX};
pub use schema::{ApisSection, CodecSection, LoggingSection, ReportingSection, ServerSection};
