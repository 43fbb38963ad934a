//! Server settings.
//!
//! ```rust
//! use ptolemy_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:9000")
//!     .request_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:9000");
//! assert_eq!(config.request_timeout(), Duration::from_secs(5));
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use ptolemy_extract::MultipartConfig;

/// Default bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default handler deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default body read deadline in milliseconds.
pub const DEFAULT_BODY_TIMEOUT_MS: u64 = 10_000;

/// Default drain time on shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default body size limit (16 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Default threshold above which a successful call is reported as slow.
pub const DEFAULT_SLOW_CALL_MS: u64 = 1_000;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    http_addr: String,
    request_timeout: Duration,
    body_timeout: Duration,
    shutdown_timeout: Duration,
    max_body_bytes: usize,
    slow_call: Option<Duration>,
    multipart: MultipartConfig,
}

impl ServerConfig {
    /// Starts a builder with default settings.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Bind address, e.g. `0.0.0.0:8080`.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.http_addr.parse()
    }

    /// Deadline for a handler invocation.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Deadline for reading a request body.
    #[must_use]
    pub const fn body_timeout(&self) -> Duration {
        self.body_timeout
    }

    /// How long in-flight connections may drain on shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Largest accepted request body.
    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Slow-call threshold, if slow calls are reported.
    #[must_use]
    pub const fn slow_call(&self) -> Option<Duration> {
        self.slow_call
    }

    /// Multipart limits.
    #[must_use]
    pub const fn multipart(&self) -> &MultipartConfig {
        &self.multipart
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::default().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig {
                http_addr: DEFAULT_HTTP_ADDR.to_string(),
                request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
                body_timeout: Duration::from_millis(DEFAULT_BODY_TIMEOUT_MS),
                shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
                slow_call: Some(Duration::from_millis(DEFAULT_SLOW_CALL_MS)),
                multipart: MultipartConfig::default(),
            },
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Binds to `0.0.0.0:<port>`.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.http_addr = format!("0.0.0.0:{port}");
        self
    }

    /// Sets the handler deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the body read deadline.
    #[must_use]
    pub fn body_timeout(mut self, timeout: Duration) -> Self {
        self.config.body_timeout = timeout;
        self
    }

    /// Sets the shutdown drain time.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the body size limit.
    #[must_use]
    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.config.max_body_bytes = max;
        self
    }

    /// Sets the slow-call threshold. `None` disables slow-call reports.
    #[must_use]
    pub fn slow_call(mut self, threshold: Option<Duration>) -> Self {
        self.config.slow_call = threshold;
        self
    }

    /// Sets multipart limits.
    #[must_use]
    pub fn multipart(mut self, multipart: MultipartConfig) -> Self {
        self.config.multipart = multipart;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
