//! The root configuration type.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use ptolemy_core::Codec;
use ptolemy_telemetry::{create_env_filter, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::schema::{ApisSection, CodecSection, LoggingSection, ReportingSection, ServerSection};
use crate::ConfigError;

/// Port used when nothing else names one.
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable consulted after `--port`.
pub const PORT_ENV: &str = "PORT";

/// Complete service configuration.
///
/// ```
/// use ptolemy_config::PtolemyConfig;
///
/// let config = PtolemyConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.apis.builtin);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PtolemyConfig {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerSection,

    /// API discovery and compilation.
    #[serde(default)]
    pub apis: ApisSection,

    /// Model JSON codec.
    #[serde(default)]
    pub codec: CodecSection,

    /// Crash reporting.
    #[serde(default)]
    pub reporting: ReportingSection,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PtolemyConfig {
    /// Pretty logs at `debug`, lenient codec.
    ///
    /// ```
    /// use ptolemy_config::PtolemyConfig;
    ///
    /// let config = PtolemyConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.codec.unknown_fields = ptolemy_core::UnknownFields::Tolerate;
        config
    }

    /// JSON logs at `info`, strict codec.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        if self.server.port == Some(0) {
            return Err(ConfigError::invalid_value("server.port", "must not be 0"));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.server.body_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.body_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than 0",
            ));
        }
        if self.apis.path.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("apis.path", "must not be empty"));
        }
        if self.codec.timestamp_format.is_empty()
            || StrftimeItems::new(&self.codec.timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(ConfigError::invalid_value(
                "codec.timestamp_format",
                format!("invalid strftime pattern: '{}'", self.codec.timestamp_format),
            ));
        }
        if let Err(e) = create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }
        Ok(())
    }

    /// Resolves the listening port.
    ///
    /// The first of these wins: `cli`, the `PORT` variable, `server.port`
    /// (which carries `PTOLEMY__SERVER__PORT` and the file), the port in
    /// `server.http_addr`, then 8080.
    pub fn resolve_port(&self, cli: Option<u16>) -> Result<u16, ConfigError> {
        let env = std::env::var(PORT_ENV).ok();
        self.resolve_port_with(cli, env.as_deref())
    }

    pub(crate) fn resolve_port_with(
        &self,
        cli: Option<u16>,
        env: Option<&str>,
    ) -> Result<u16, ConfigError> {
        if let Some(port) = cli {
            return Ok(port);
        }
        if let Some(raw) = env.map(str::trim).filter(|raw| !raw.is_empty()) {
            return raw
                .parse()
                .map_err(|_| ConfigError::env_parse_error(PORT_ENV, "expected a port number"));
        }
        if let Some(port) = self.server.port {
            return Ok(port);
        }
        Ok(self
            .server
            .http_addr
            .parse::<SocketAddr>()
            .map_or(DEFAULT_PORT, |addr| addr.port()))
    }

    /// The bind address with the resolved port applied.
    pub fn bind_addr(&self, cli_port: Option<u16>) -> Result<SocketAddr, ConfigError> {
        let mut addr: SocketAddr = self.server.http_addr.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            )
        })?;
        addr.set_port(self.resolve_port(cli_port)?);
        Ok(addr)
    }

    /// Handler deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// Body read deadline.
    #[must_use]
    pub const fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.server.body_timeout_ms)
    }

    /// Connection drain deadline.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Slow-call threshold, `None` when disabled.
    #[must_use]
    pub fn slow_call(&self) -> Option<Duration> {
        (self.reporting.enabled && self.reporting.slow_call_ms > 0)
            .then(|| Duration::from_millis(self.reporting.slow_call_ms))
    }

    /// The model codec described by `[codec]`.
    #[must_use]
    pub fn codec(&self) -> Codec {
        Codec::new()
            .with_unknown_fields(self.codec.unknown_fields)
            .with_timestamp_format(self.codec.timestamp_format.clone())
    }

    /// The logging setup described by `[logging]`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let base = match self.logging.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        base.with_level(self.logging.level.clone())
    }
}
