//! The middleware chain, composed once at startup.

use std::fmt;
use std::sync::Arc;

use ptolemy_core::{ApiError, RequestContext};
use tracing::debug;

use crate::stage::{PostStage, PreStage, Response};

/// Pre stages in order, then post stages in order.
///
/// Immutable once built. Pre stages run in registration order and stop at
/// the first error. Post stages run in registration order on every response.
///
/// ```rust
/// use ptolemy_middleware::{Chain, RequestIdStage};
/// use std::sync::Arc;
///
/// let request_id = Arc::new(RequestIdStage::new());
/// let chain = Chain::builder()
///     .pre_arc(request_id.clone())
///     .post_arc(request_id)
///     .build();
/// assert_eq!(chain.pre_names(), vec!["request_id"]);
/// assert_eq!(chain.post_names(), vec!["request_id"]);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    pre: Vec<Arc<dyn PreStage>>,
    post: Vec<Arc<dyn PostStage>>,
}

impl Chain {
    /// Starts a chain.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// A chain with no stages.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Runs the pre stages.
    pub async fn run_pre(&self, mut ctx: RequestContext) -> Result<RequestContext, ApiError> {
        for stage in &self.pre {
            ctx = stage.before(ctx).await.map_err(|err| {
                debug!(stage = stage.name(), code = err.code(), "pre stage rejected request");
                err
            })?;
        }
        Ok(ctx)
    }

    /// Runs the post stages.
    pub async fn run_post(&self, ctx: &RequestContext, mut response: Response) -> Response {
        for stage in &self.post {
            let status = response.status();
            response = stage.after(ctx, response).await;
            if response.status() != status {
                tracing::warn!(
                    stage = stage.name(),
                    from = status.as_u16(),
                    to = response.status().as_u16(),
                    "post stage changed the response status"
                );
            }
        }
        response
    }

    /// Pre stage names, in order.
    #[must_use]
    pub fn pre_names(&self) -> Vec<&'static str> {
        self.pre.iter().map(|s| s.name()).collect()
    }

    /// Post stage names, in order.
    #[must_use]
    pub fn post_names(&self) -> Vec<&'static str> {
        self.post.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("pre", &self.pre_names())
            .field("post", &self.post_names())
            .finish()
    }
}

/// Builder for [`Chain`].
#[derive(Default)]
pub struct ChainBuilder {
    pre: Vec<Arc<dyn PreStage>>,
    post: Vec<Arc<dyn PostStage>>,
}

impl ChainBuilder {
    /// Appends a pre stage.
    #[must_use]
    pub fn pre(self, stage: impl PreStage) -> Self {
        self.pre_arc(Arc::new(stage))
    }

    /// Appends a shared pre stage.
    #[must_use]
    pub fn pre_arc(mut self, stage: Arc<dyn PreStage>) -> Self {
        self.pre.push(stage);
        self
    }

    /// Appends a post stage.
    #[must_use]
    pub fn post(self, stage: impl PostStage) -> Self {
        self.post_arc(Arc::new(stage))
    }

    /// Appends a shared post stage.
    #[must_use]
    pub fn post_arc(mut self, stage: Arc<dyn PostStage>) -> Self {
        self.post.push(stage);
        self
    }

    /// Freezes the chain.
    #[must_use]
    pub fn build(self) -> Chain {
        Chain {
            pre: self.pre,
            post: self.post,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{post_fn, pre_fn};
    use http::StatusCode;

    fn ok() -> Response {
        http::Response::builder()
            .status(StatusCode::OK)
            .body(bytes::Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_pre_stages_run_in_order() {
        let chain = Chain::builder()
            .pre(pre_fn("first", |ctx: RequestContext| async move {
                Ok::<_, ApiError>(ctx.with_caller(ptolemy_core::Caller::anonymous().with_user_id("a")))
            }))
            .pre(pre_fn("second", |mut ctx: RequestContext| async move {
                let seen = ctx.caller().user_id.clone().unwrap_or_default();
                ctx.caller_mut().user_id = Some(format!("{seen}b"));
                Ok::<_, ApiError>(ctx)
            }))
            .build();

        let ctx = chain.run_pre(RequestContext::mock()).await.unwrap();
        assert_eq!(ctx.caller().user_id.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_pre_error_short_circuits() {
        let chain = Chain::builder()
            .pre(pre_fn("deny", |_ctx: RequestContext| async {
                Err::<RequestContext, _>(ApiError::token_invalid("bad token"))
            }))
            .pre(pre_fn("never", |_ctx: RequestContext| async {
                Err::<RequestContext, _>(ApiError::unhandled("second stage ran"))
            }))
            .build();

        let err = chain.run_pre(RequestContext::mock()).await.unwrap_err();
        assert_eq!(err.code(), "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn test_post_stages_rewrite_response() {
        let chain = Chain::builder()
            .post(post_fn("tag", |_ctx, mut response| {
                response
                    .headers_mut()
                    .insert("x-tag", http::HeaderValue::from_static("1"));
                response
            }))
            .build();
        let response = chain.run_post(&RequestContext::mock(), ok()).await;
        assert_eq!(response.headers()["x-tag"], "1");
    }

    #[test]
    fn test_empty_chain() {
        let chain = Chain::empty();
        assert!(chain.pre_names().is_empty());
        assert!(format!("{chain:?}").contains("Chain"));
    }
}
