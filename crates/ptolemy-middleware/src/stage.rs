//! Stage traits.
//!
//! A pre stage runs before routing and may reject the request; a post stage
//! runs on every response, errors included, and cannot fail.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ptolemy_core::{ApiError, RequestContext};

/// Response type seen by post stages.
pub type Response = http::Response<Bytes>;

/// A stage run before the request is dispatched.
#[async_trait]
pub trait PreStage: Send + Sync + 'static {
    /// Stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Inspects or enriches the context. An error short-circuits the chain
    /// and becomes the response.
    async fn before(&self, ctx: RequestContext) -> Result<RequestContext, ApiError>;
}

/// A stage run on the response.
#[async_trait]
pub trait PostStage: Send + Sync + 'static {
    /// Stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Rewrites the response. Must not change its status.
    async fn after(&self, ctx: &RequestContext, response: Response) -> Response;
}

/// A pre stage backed by a closure.
pub struct FnPreStage<F> {
    name: &'static str,
    f: F,
}

/// Wraps a closure as a [`PreStage`].
///
/// ```rust
/// use ptolemy_core::{ApiError, RequestContext};
/// use ptolemy_middleware::{pre_fn, PreStage};
///
/// let deny = pre_fn("deny", |_ctx: RequestContext| async {
///     Err::<RequestContext, _>(ApiError::invalid_parameter("nope"))
/// });
/// assert_eq!(deny.name(), "deny");
/// ```
pub fn pre_fn<F, Fut>(name: &'static str, f: F) -> FnPreStage<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestContext, ApiError>> + Send + 'static,
{
    FnPreStage { name, f }
}

#[async_trait]
impl<F, Fut> PreStage for FnPreStage<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestContext, ApiError>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn before(&self, ctx: RequestContext) -> Result<RequestContext, ApiError> {
        (self.f)(ctx).await
    }
}

/// Synchronous response rewrite used by [`post_fn`].
pub type PostFn = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

/// A post stage backed by a closure.
pub struct FnPostStage {
    name: &'static str,
    f: PostFn,
}

/// Wraps a synchronous closure as a [`PostStage`].
pub fn post_fn<F>(name: &'static str, f: F) -> FnPostStage
where
    F: Fn(&RequestContext, Response) -> Response + Send + Sync + 'static,
{
    FnPostStage {
        name,
        f: Arc::new(f),
    }
}

#[async_trait]
impl PostStage for FnPostStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn after(&self, ctx: &RequestContext, response: Response) -> Response {
        (self.f)(ctx, response)
    }
}

