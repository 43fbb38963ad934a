//! Request id stage.
//!
//! Reads a UUID from `x-request-id` or generates a v7 one, and echoes it on
//! the response so clients can correlate calls with server logs.

use async_trait::async_trait;
use http::HeaderValue;
use ptolemy_core::{ApiError, RequestContext, RequestId};
use uuid::Uuid;

use crate::stage::{PostStage, PreStage, Response};

/// The header name for request id propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Propagates request ids. Register it as both a pre and a post stage.
#[derive(Debug, Clone)]
pub struct RequestIdStage {
    trust_incoming: bool,
}

impl Default for RequestIdStage {
    fn default() -> Self {
        Self {
            trust_incoming: true,
        }
    }
}

impl RequestIdStage {
    /// Uses incoming ids when they are valid UUIDs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always generates a fresh id.
    #[must_use]
    pub fn ignore_incoming() -> Self {
        Self {
            trust_incoming: false,
        }
    }

    fn incoming(&self, ctx: &RequestContext) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }
        ctx.header(REQUEST_ID_HEADER)
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(RequestId::from_uuid)
    }
}

#[async_trait]
impl PreStage for RequestIdStage {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn before(&self, ctx: RequestContext) -> Result<RequestContext, ApiError> {
        let id = self.incoming(&ctx).unwrap_or_else(RequestId::new);
        Ok(ctx.with_request_id(id))
    }
}

#[async_trait]
impl PostStage for RequestIdStage {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn after(&self, ctx: &RequestContext, mut response: Response) -> Response {
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}
