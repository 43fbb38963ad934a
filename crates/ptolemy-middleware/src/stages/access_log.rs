//! Access log stage: one `info` line per response.

use async_trait::async_trait;
use ptolemy_core::RequestContext;
use tracing::{info, warn};

use crate::stage::{PostStage, Response};

/// Logs method, path, status and latency of every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

#[async_trait]
impl PostStage for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
    }

    async fn after(&self, ctx: &RequestContext, response: Response) -> Response {
        let status = response.status().as_u16();
        let elapsed_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        let operation = ctx.endpoint().map(ToString::to_string).unwrap_or_default();
        if response.status().is_server_error() {
            warn!(
                request_id = %ctx.request_id(),
                operation = %operation,
                method = %ctx.method(),
                path = %ctx.path(),
                caller = %ctx.caller().log_id(),
                status,
                elapsed_ms,
                "request failed"
            );
        } else {
            info!(
                request_id = %ctx.request_id(),
                operation = %operation,
                method = %ctx.method(),
                path = %ctx.path(),
                caller = %ctx.caller().log_id(),
                status,
                elapsed_ms,
                "request completed"
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_response_passes_through() {
        let response = http::Response::builder()
            .status(503)
            .body(Bytes::from_static(b"x"))
            .unwrap();
        let out = AccessLog.after(&RequestContext::mock(), response).await;
        assert_eq!(out.status(), 503);
        assert_eq!(out.body(), &Bytes::from_static(b"x"));
    }
}
