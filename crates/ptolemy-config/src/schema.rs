//! Configuration sections.
//!
//! Every section rejects unknown fields and falls back to defaults for
//! missing ones, so a file only needs to name what it changes.

use std::path::PathBuf;

use ptolemy_core::{UnknownFields, DEFAULT_TIMESTAMP_FORMAT};
use ptolemy_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

/// HTTP listener settings.
///
/// ```
/// use ptolemy_config::ServerSection;
///
/// let server = ServerSection::default();
/// assert_eq!(server.http_addr, "0.0.0.0:8080");
/// assert_eq!(server.port, None);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address, e.g. `0.0.0.0:8080`.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Replaces the port of `http_addr` when set.
    #[serde(default)]
    pub port: Option<u16>,

    /// Handler deadline in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Request body read deadline in milliseconds.
    #[serde(default = "default_body_timeout")]
    pub body_timeout_ms: u64,

    /// Connection drain deadline in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            port: None,
            request_timeout_ms: default_request_timeout(),
            body_timeout_ms: default_body_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_body_timeout() -> u64 {
    10_000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

/// Where API documents live and how they are compiled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ApisSection {
    /// Directory scanned for `*.yaml` and `*.yml` documents.
    #[serde(default = "default_apis_path")]
    pub path: PathBuf,

    /// API names to skip.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Serve the builtin `ping` API.
    #[serde(default = "default_true")]
    pub builtin: bool,

    /// Where compiled artifacts are cached. No cache when unset.
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    /// Recompile even when a cached artifact is fresh.
    #[serde(default)]
    pub force: bool,
}

impl Default for ApisSection {
    fn default() -> Self {
        Self {
            path: default_apis_path(),
            ignore: Vec::new(),
            builtin: true,
            artifact_dir: None,
            force: false,
        }
    }
}

fn default_apis_path() -> PathBuf {
    PathBuf::from("apis")
}

const fn default_true() -> bool {
    true
}

/// Model JSON codec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CodecSection {
    /// `reject` or `tolerate`.
    #[serde(default)]
    pub unknown_fields: UnknownFields,

    /// `chrono` strftime pattern for date-time fields.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

impl Default for CodecSection {
    fn default() -> Self {
        Self {
            unknown_fields: UnknownFields::default(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

/// Crash and slow-call reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReportingSection {
    /// Send reports at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Successful calls slower than this are reported. `0` disables.
    #[serde(default = "default_slow_call_ms")]
    pub slow_call_ms: u64,

    /// Name used in report titles. Defaults to the package name.
    #[serde(default)]
    pub service_name: Option<String>,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_call_ms: default_slow_call_ms(),
            service_name: None,
        }
    }
}

const fn default_slow_call_ms() -> u64 {
    1000
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directives.
    #[serde(default = "default_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Json,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
