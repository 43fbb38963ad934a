//! Request dispatcher.
//!
//! Drives one request through
//! `Received → Parsing → Invoking → ValidatingResult → Serializing → Done`,
//! with `Error` reachable from every state. Every failure ends as an error
//! envelope; nothing escapes to the transport.
//!
//! ```text
//! pre chain ─► route ─► parse ─► invoke ─► validate ─► serialize ─► post chain
//!     │          │        │         │          │                       ▲
//!     └──────────┴────────┴─────────┴──────────┴──► envelope ──────────┘
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::StatusCode;
use ptolemy_compiler::{CompiledApi, CompiledBinding};
use ptolemy_core::{
    ApiError, Codec, CrashDesk, DispatchState, ErrorKind, Invocation, ModelInstance,
    ModelRegistry, ModelSet, Outcome, ParamLocation, RequestContext,
};
use ptolemy_extract::{extract_params, parse_query, read_payload, MultipartConfig, ParamSources};
use ptolemy_middleware::{Chain, Response};
use serde_json::Value as Json;
use tracing::{debug, error, warn};

use crate::classify::{classify, classify_panic};
use crate::config::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SLOW_CALL_MS};
use crate::error::ServerResult;
use crate::routes::{Resolution, RouteTable};

const JSON: &str = "application/json";

/// A validated handler result.
enum Validated {
    Model(ModelInstance),
    Reply(Response),
}

/// Routes requests to compiled bindings.
///
/// Shared read-only between connections.
pub struct Dispatcher {
    routes: RouteTable,
    registry: Arc<ModelRegistry>,
    chain: Chain,
    codec: Codec,
    crash: CrashDesk,
    handler_timeout: Duration,
    slow_call: Option<Duration>,
    multipart: MultipartConfig,
}

impl Dispatcher {
    /// Starts a dispatcher over a frozen registry.
    #[must_use]
    pub fn builder(registry: Arc<ModelRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            apis: Vec::new(),
            registry,
            chain: Chain::empty(),
            codec: Codec::default(),
            crash: CrashDesk::default(),
            handler_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            slow_call: Some(Duration::from_millis(DEFAULT_SLOW_CALL_MS)),
            multipart: MultipartConfig::default(),
        }
    }

    /// The route table.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The model registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// The crash desk errors are reported to.
    #[must_use]
    pub const fn crash_desk(&self) -> &CrashDesk {
        &self.crash
    }

    /// Handles one request.
    pub async fn dispatch(&self, ctx: RequestContext) -> Response {
        let fallback = ctx.clone();
        let mut ctx = match self.chain.run_pre(ctx).await {
            Ok(ctx) => ctx,
            Err(err) => return self.reject(fallback, err).await,
        };

        let (binding, params) = match self.routes.resolve(ctx.method(), ctx.path()) {
            Resolution::Matched { binding, params } => (Arc::clone(binding), params),
            Resolution::MethodNotAllowed { allowed } => {
                let err = ApiError::new(
                    ErrorKind::method_not_allowed(),
                    format!("{} is not allowed on {}", ctx.method(), ctx.path()),
                );
                let mut response = self.fail(&mut ctx, None, err);
                let allow = allowed
                    .iter()
                    .map(http::Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers_mut().insert(ALLOW, value);
                }
                return self.chain.run_post(&ctx, response).await;
            }
            Resolution::NotFound => {
                let err = ApiError::new(
                    ErrorKind::not_found(),
                    format!("no route for {} {}", ctx.method(), ctx.path()),
                );
                return self.reject(ctx, err).await;
            }
        };

        ctx = ctx
            .with_path_params(params)
            .with_endpoint(binding.endpoint_id());

        let response = match self.execute(&mut ctx, &binding).await {
            Ok(response) => {
                ctx.transition(DispatchState::Done);
                self.check_slow_call(&ctx, response.status());
                response
            }
            Err(err) => self.fail(&mut ctx, Some(&binding), err),
        };

        self.chain.run_post(&ctx, response).await
    }

    /// Answers with an error envelope without routing, then runs the post
    /// chain. Used for failures detected before dispatch, such as a body
    /// that could not be read.
    pub async fn reject(&self, mut ctx: RequestContext, err: ApiError) -> Response {
        let response = self.fail(&mut ctx, None, err);
        self.chain.run_post(&ctx, response).await
    }

    async fn execute(
        &self,
        ctx: &mut RequestContext,
        binding: &CompiledBinding,
    ) -> Result<Response, ApiError> {
        let models = self.registry.get(&binding.api).cloned().ok_or_else(|| {
            ApiError::unhandled(format!("no models registered for api '{}'", binding.api))
        })?;

        ctx.transition(DispatchState::Parsing);
        let invocation = self.parse(ctx, binding, Arc::clone(&models)).await?;

        ctx.transition(DispatchState::Invoking);
        let outcome = self.invoke(binding, invocation).await?;

        ctx.transition(DispatchState::ValidatingResult);
        let validated = check_result(binding, &models, outcome)?;

        ctx.transition(DispatchState::Serializing);
        match validated {
            Validated::Reply(reply) => Ok(reply),
            Validated::Model(instance) => {
                let mut body = instance.to_json(&self.codec);
                if let Some(decorator) = &binding.decorator {
                    decorator(ctx, &mut body);
                }
                Ok(json_response(StatusCode::OK, &body))
            }
        }
    }

    /// Builds the handler's input. Every failure here is the caller's fault.
    async fn parse(
        &self,
        ctx: &RequestContext,
        binding: &CompiledBinding,
        models: Arc<ModelSet>,
    ) -> Result<Invocation, ApiError> {
        let payload = if binding.body_model.is_some() || binding.takes_form() {
            Some(read_payload(ctx.content_type(), ctx.body().clone(), &self.multipart).await?)
        } else {
            None
        };

        let body = match (&binding.body_model, &payload) {
            (Some(model), Some(payload)) => {
                let decoded = if payload.kind.is_form() {
                    models.decode_form(model, &payload.fields, payload.files.clone(), &self.codec)
                } else {
                    models.decode(model, &payload.fields, &self.codec)
                };
                Some(decoded.map_err(|e| ApiError::invalid_parameter(e.to_string()))?)
            }
            _ => None,
        };

        let query = parse_query(ctx.query())?;
        let params = extract_params(
            &binding.params,
            ParamSources {
                path: ctx.path_params(),
                query: &query,
                payload: payload.as_ref(),
            },
        )?;

        let mut invocation = Invocation::new(ctx.clone(), models, self.codec.clone());
        for spec in binding.params.iter().filter(|p| p.location != ParamLocation::Body) {
            invocation = invocation.declare(spec.name.clone());
        }
        if let Some(body) = body {
            invocation = invocation.with_body(body);
        }
        for (name, value) in params {
            invocation = invocation.with_param(name, value);
        }
        Ok(invocation)
    }

    async fn invoke(
        &self,
        binding: &CompiledBinding,
        invocation: Invocation,
    ) -> Result<Outcome, ApiError> {
        let handler = Arc::clone(&binding.handler);
        let call = AssertUnwindSafe(async move { handler(invocation).await }).catch_unwind();

        match tokio::time::timeout(self.handler_timeout, call).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(err))) => Err(classify(err)),
            Ok(Err(panic)) => Err(classify_panic(panic)),
            Err(_) => Err(ApiError::request_timeout(format!(
                "{} did not complete within {} ms",
                binding.handler_name,
                self.handler_timeout.as_millis()
            ))),
        }
    }

    /// Turns an error into an envelope response and reports it if needed.
    fn fail(
        &self,
        ctx: &mut RequestContext,
        binding: Option<&CompiledBinding>,
        mut err: ApiError,
    ) -> Response {
        ctx.transition(DispatchState::Error);
        let error_id = err.ensure_error_id();
        let status = err.status_code();

        if status.is_server_error() {
            error!(
                request_id = %ctx.request_id(),
                error_id = %error_id,
                code = err.code(),
                status = status.as_u16(),
                caught = err.caught().unwrap_or("-"),
                "{}",
                err.description()
            );
        } else {
            debug!(
                request_id = %ctx.request_id(),
                error_id = %error_id,
                code = err.code(),
                status = status.as_u16(),
                "{}",
                err.description()
            );
        }

        let mut body = serde_json::to_value(err.to_envelope()).unwrap_or_default();
        if let Some(decorator) = binding.and_then(|b| b.decorator.as_ref()) {
            decorator(ctx, &mut body);
        }

        if err.should_report() && self.crash.is_enabled() {
            self.crash.submit(self.crash.for_error(ctx, &err));
        }

        json_response(status, &body)
    }

    fn check_slow_call(&self, ctx: &RequestContext, status: StatusCode) {
        let Some(threshold) = self.slow_call else {
            return;
        };
        let elapsed = ctx.elapsed();
        if elapsed > threshold && self.crash.is_enabled() {
            warn!(
                request_id = %ctx.request_id(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                threshold_ms = u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX),
                "slow call"
            );
            self.crash.submit(self.crash.slow_call(ctx, status.as_u16()));
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes)
            .field("chain", &self.chain)
            .field("handler_timeout", &self.handler_timeout)
            .field("slow_call", &self.slow_call)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    apis: Vec<CompiledApi>,
    registry: Arc<ModelRegistry>,
    chain: Chain,
    codec: Codec,
    crash: CrashDesk,
    handler_timeout: Duration,
    slow_call: Option<Duration>,
    multipart: MultipartConfig,
}

impl DispatcherBuilder {
    /// Serves a compiled API.
    #[must_use]
    pub fn api(mut self, api: CompiledApi) -> Self {
        self.apis.push(api);
        self
    }

    /// Serves several compiled APIs.
    #[must_use]
    pub fn apis(mut self, apis: impl IntoIterator<Item = CompiledApi>) -> Self {
        self.apis.extend(apis);
        self
    }

    /// Sets the middleware chain.
    #[must_use]
    pub fn chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    /// Sets the JSON policy.
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Sets where errors are reported.
    #[must_use]
    pub fn crash_desk(mut self, crash: CrashDesk) -> Self {
        self.crash = crash;
        self
    }

    /// Sets the handler deadline.
    #[must_use]
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Sets the slow-call threshold. `None` disables slow-call reports.
    #[must_use]
    pub fn slow_call(mut self, threshold: Option<Duration>) -> Self {
        self.slow_call = threshold;
        self
    }

    /// Sets multipart limits.
    #[must_use]
    pub fn multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    /// Builds the route table.
    ///
    /// Fails if two bindings share a method and route.
    pub fn build(self) -> ServerResult<Dispatcher> {
        let mut routes = RouteTable::new();
        for api in self.apis {
            let name = api.name;
            for binding in api.bindings {
                debug!(api = %name, method = %binding.method, route = %binding.route, handler = %binding.handler_name, "binding route");
                routes.insert(binding)?;
            }
        }

        Ok(Dispatcher {
            routes,
            registry: self.registry,
            chain: self.chain,
            codec: self.codec,
            crash: self.crash,
            handler_timeout: self.handler_timeout,
            slow_call: self.slow_call,
            multipart: self.multipart,
        })
    }
}

/// Returns `true` if `name` or one of its `x-parent` ancestors is a
/// declared result model.
fn accepts_model(binding: &CompiledBinding, models: &ModelSet, name: &str) -> bool {
    let mut current = Some(name);
    for _ in 0..=models.len() {
        let Some(name) = current else {
            return false;
        };
        if binding.accepts_result(name) {
            return true;
        }
        current = models.get(name).and_then(|m| m.parent());
    }
    false
}

fn check_result(
    binding: &CompiledBinding,
    models: &ModelSet,
    outcome: Outcome,
) -> Result<Validated, ApiError> {
    match outcome {
        Outcome::Model(instance) if accepts_model(binding, models, instance.model_name()) => {
            instance.validate()?;
            Ok(Validated::Model(instance))
        }
        Outcome::Model(instance) => Err(ApiError::bad_response(format!(
            "{} returned model {}, expected one of: {}",
            binding.handler_name,
            instance.model_name(),
            binding
                .result_models
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
        Outcome::Reply(reply) => Ok(Validated::Reply(reply)),
        Outcome::Nothing => Err(ApiError::bad_response("Nothing to return in response")),
        other @ Outcome::Value(_) => Err(ApiError::bad_response(format!(
            "{} returned a {} instead of a model",
            binding.handler_name,
            other.describe()
        ))),
    }
}

fn json_response(status: StatusCode, body: &Json) -> Response {
    let bytes = serde_json::to_vec(body).map(Bytes::from).unwrap_or_default();
    let mut response = Response::new(bytes);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    response
}
