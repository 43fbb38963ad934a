//! Crash reports.
//!
//! Every 5xx, every error marked reportable and every slow call produces a
//! [`CrashReport`]. Reports are handed to a pluggable [`CrashReporter`] from
//! a spawned task, so reporting never delays the response and a failing
//! reporter only costs a warning.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::ApiError;

/// Start and end of the reported call.
#[derive(Debug, Clone, Serialize)]
pub struct CallTime {
    /// When the request was received.
    pub start: DateTime<Utc>,
    /// When the report was built.
    pub end: DateTime<Utc>,
    /// Duration in microseconds.
    pub microsecs: u128,
}

/// The response the caller got.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedResponse {
    /// HTTP status.
    pub status: u16,
    /// Taxonomy code.
    pub error_code: String,
    /// Error description.
    pub error_description: String,
    /// Message meant for end users, if any.
    pub user_message: Option<String>,
}

/// Who made the call.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedUser {
    /// Verified user id.
    pub id: Option<String>,
    /// Whether a token was verified.
    pub is_auth: bool,
    /// Peer address.
    pub ip: Option<String>,
    /// First `X-Forwarded-For` hop.
    pub forwarded_ip: Option<String>,
    /// User agent.
    pub user_agent: Option<String>,
}

/// The server that handled the call.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedServer {
    /// Service name from the configuration.
    pub service: String,
    /// API the endpoint belongs to.
    pub api_name: Option<String>,
    /// Listening port.
    pub port: u16,
}

/// The endpoint that was called.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedEndpoint {
    /// `<api> <METHOD> <path>`.
    pub id: String,
    /// Full request URI.
    pub url: String,
    /// Route template, or the raw path when routing failed.
    pub path: String,
    /// HTTP method.
    pub method: String,
}

/// One crash or slow-call report.
#[derive(Debug, Clone, Serialize)]
pub struct CrashReport {
    /// `FATAL ERROR ...` or `NON-FATAL ERROR ...`.
    pub title: String,
    /// Whether the error was a server fault.
    pub is_fatal: bool,
    /// Error id, as sent in the envelope.
    pub error_id: Option<String>,
    /// Timing.
    pub time: CallTime,
    /// Response summary.
    pub response: ReportedResponse,
    /// `X-Call-ID` header.
    pub call_id: Option<String>,
    /// `X-Call-Path` header.
    pub call_path: Option<String>,
    /// Caller.
    pub user: ReportedUser,
    /// Server.
    pub server: ReportedServer,
    /// Endpoint.
    pub endpoint: ReportedEndpoint,
    /// Internal detail of the underlying failure. Never sent to clients.
    pub error_caught: Option<String>,
    /// Stack trace taken where the failure happened, when one was captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Receives crash reports.
///
/// Implementations typically forward to an alerting system. Returning an
/// error only produces a warning log.
#[async_trait]
pub trait CrashReporter: Send + Sync + 'static {
    /// Delivers one report.
    async fn report(&self, report: &CrashReport) -> anyhow::Result<()>;
}

/// Writes reports to the log at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl CrashReporter for LogReporter {
    async fn report(&self, report: &CrashReport) -> anyhow::Result<()> {
        let body = serde_json::to_string(report)?;
        tracing::error!(
            title = %report.title,
            error_id = report.error_id.as_deref().unwrap_or("-"),
            report = %body,
            "crash report"
        );
        Ok(())
    }
}

/// Builds reports and sends them in the background.
#[derive(Clone)]
pub struct CrashDesk {
    reporter: Arc<dyn CrashReporter>,
    service: String,
    port: u16,
    enabled: bool,
}

impl CrashDesk {
    /// Creates a desk that reports to `reporter`.
    #[must_use]
    pub fn new(reporter: Arc<dyn CrashReporter>) -> Self {
        Self {
            reporter,
            service: "ptolemy".to_string(),
            port: 0,
            enabled: true,
        }
    }

    /// Sets the service name used in titles.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Sets the listening port shown in reports.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Turns reporting on or off.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns `true` if reports are sent.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Builds the report for a failed call.
    #[must_use]
    pub fn for_error(&self, ctx: &RequestContext, err: &ApiError) -> CrashReport {
        let severity = if err.is_fatal() {
            "FATAL ERROR"
        } else {
            "NON-FATAL ERROR"
        };
        let title = format!(
            "{severity} {} {} {}: {}",
            self.service,
            err.status_code().as_u16(),
            err.code(),
            err.description()
        );
        self.build(ctx, title, err)
    }

    /// Builds the report for a call that succeeded but took too long.
    #[must_use]
    pub fn slow_call(&self, ctx: &RequestContext, status: u16) -> CrashReport {
        let elapsed = ctx.elapsed();
        let endpoint = ctx
            .endpoint()
            .map_or_else(|| ctx.path().to_string(), ToString::to_string);
        let description = format!("{endpoint} took {} ms", elapsed.as_millis());
        let title = format!("NON-FATAL ERROR {} {status} slow call: {description}", self.service);
        let mut report = self.build(ctx, title, &ApiError::unhandled(description));
        report.is_fatal = false;
        report.response.status = status;
        report.response.error_code = "SLOW_CALL".to_string();
        report
    }

    fn build(&self, ctx: &RequestContext, title: String, err: &ApiError) -> CrashReport {
        let end = Utc::now();
        let caller = ctx.caller();
        let endpoint = ctx.endpoint();
        CrashReport {
            title,
            is_fatal: err.is_fatal(),
            error_id: err.error_id().map(|id| id.to_string()),
            time: CallTime {
                start: ctx.received_at(),
                end,
                microsecs: ctx.elapsed().as_micros(),
            },
            response: ReportedResponse {
                status: err.status_code().as_u16(),
                error_code: err.code().to_string(),
                error_description: err.description().to_string(),
                user_message: err.user_message().map(ToString::to_string),
            },
            call_id: ctx.header("x-call-id").map(ToString::to_string),
            call_path: ctx.header("x-call-path").map(ToString::to_string),
            user: ReportedUser {
                id: caller.user_id.clone(),
                is_auth: caller.is_authenticated(),
                ip: caller.ip.clone(),
                forwarded_ip: caller.forwarded_ip.clone(),
                user_agent: caller.user_agent.clone(),
            },
            server: ReportedServer {
                service: self.service.clone(),
                api_name: endpoint.map(|e| e.api.clone()),
                port: self.port,
            },
            endpoint: ReportedEndpoint {
                id: endpoint.map_or_else(
                    || format!("{} {}", ctx.method(), ctx.path()),
                    ToString::to_string,
                ),
                url: ctx.uri().to_string(),
                path: endpoint.map_or_else(|| ctx.path().to_string(), |e| e.path.clone()),
                method: ctx.method().to_string(),
            },
            error_caught: err.caught().map(ToString::to_string),
            trace: err.trace().map(ToString::to_string),
        }
    }

    /// Sends a report from a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, report: CrashReport) {
        if !self.enabled {
            return;
        }
        let reporter = Arc::clone(&self.reporter);
        tokio::spawn(async move {
            if let Err(e) = reporter.report(&report).await {
                tracing::warn!(error = %e, title = %report.title, "crash reporter failed");
            }
        });
    }
}

impl Default for CrashDesk {
    fn default() -> Self {
        Self::new(Arc::new(LogReporter))
    }
}

impl std::fmt::Debug for CrashDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashDesk")
            .field("service", &self.service)
            .field("port", &self.port)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EndpointId;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collecting {
        reports: Mutex<Vec<CrashReport>>,
    }

    #[async_trait]
    impl CrashReporter for Collecting {
        async fn report(&self, report: &CrashReport) -> anyhow::Result<()> {
            self.reports.lock().push(report.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl CrashReporter for Failing {
        async fn report(&self, _report: &CrashReport) -> anyhow::Result<()> {
            anyhow::bail!("alerting backend is down")
        }
    }

    fn routed_ctx() -> RequestContext {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-call-id", "call-1".parse().unwrap());
        headers.insert("x-call-path", "front.items".parse().unwrap());
        RequestContext::new(
            http::Method::GET,
            http::Uri::from_static("/item/42?verbose=1"),
            headers,
            bytes::Bytes::new(),
        )
        .with_endpoint(EndpointId {
            api: "items".to_string(),
            method: "GET".to_string(),
            path: "/item/{item_id}".to_string(),
            handler: "items.get_item".to_string(),
        })
    }

    #[test]
    fn test_report_fields() {
        let desk = CrashDesk::default().with_service("shop").with_port(8080);
        let mut err = ApiError::unhandled("boom").with_caught("NullPointer at line 3");
        err.ensure_error_id();
        let report = desk.for_error(&routed_ctx(), &err);

        assert_eq!(report.title, "FATAL ERROR shop 500 UNHANDLED_SERVER_ERROR: boom");
        assert!(report.is_fatal);
        assert!(report.error_id.is_some());
        assert_eq!(report.call_id.as_deref(), Some("call-1"));
        assert_eq!(report.call_path.as_deref(), Some("front.items"));
        assert_eq!(report.endpoint.id, "items GET /item/{item_id}");
        assert_eq!(report.endpoint.url, "/item/42?verbose=1");
        assert_eq!(report.server.api_name.as_deref(), Some("items"));
        assert_eq!(report.server.port, 8080);
        assert_eq!(report.error_caught.as_deref(), Some("NullPointer at line 3"));
        assert!(!report.user.is_auth);
        assert_eq!(report.trace, None);
    }

    #[test]
    fn test_trace_comes_from_the_failure() {
        let desk = CrashDesk::default();
        let err = ApiError::unhandled("boom").with_trace("0: items::get_item\n1: tokio::runtime");
        let report = desk.for_error(&routed_ctx(), &err);
        assert_eq!(report.trace.as_deref(), Some("0: items::get_item\n1: tokio::runtime"));

        let slow = desk.slow_call(&routed_ctx(), 200);
        assert_eq!(slow.trace, None);
        let body = serde_json::to_value(&slow).unwrap();
        assert!(body.get("trace").is_none());
    }

    #[test]
    fn test_non_fatal_title() {
        let desk = CrashDesk::default();
        let err = ApiError::invalid_parameter("bad").reportable();
        let report = desk.for_error(&RequestContext::mock(), &err);
        assert!(report.title.starts_with("NON-FATAL ERROR ptolemy 400 INVALID_PARAMETER"));
        assert_eq!(report.endpoint.id, "GET /");
    }

    #[test]
    fn test_slow_call_report() {
        let desk = CrashDesk::default();
        let report = desk.slow_call(&routed_ctx(), 200);
        assert!(report.title.starts_with("NON-FATAL ERROR ptolemy 200 slow call"));
        assert!(!report.is_fatal);
        assert_eq!(report.response.status, 200);
        assert_eq!(report.response.error_code, "SLOW_CALL");
    }

    #[tokio::test]
    async fn test_submit_delivers_in_background() {
        let collecting = Arc::new(Collecting::default());
        let desk = CrashDesk::new(collecting.clone());
        desk.submit(desk.for_error(&RequestContext::mock(), &ApiError::unhandled("boom")));

        for _ in 0..50 {
            if !collecting.reports.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(collecting.reports.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_reporter_is_swallowed() {
        let desk = CrashDesk::new(Arc::new(Failing));
        desk.submit(desk.for_error(&RequestContext::mock(), &ApiError::unhandled("boom")));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_disabled_desk_sends_nothing() {
        let collecting = Arc::new(Collecting::default());
        let desk = CrashDesk::new(collecting.clone()).enabled(false);
        desk.submit(desk.for_error(&RequestContext::mock(), &ApiError::unhandled("boom")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(collecting.reports.lock().is_empty());
    }
}
