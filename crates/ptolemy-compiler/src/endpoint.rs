//! Endpoint compiler: operations to [`CompiledBinding`]s.

use std::fmt;
use std::sync::Arc;

use http::Method;
use indexmap::IndexSet;
use ptolemy_core::{
    ApiError, BoxFuture, BoxedHandler, Decorator, EndpointId, HandlerError, HandlerResult,
    HandlerTable, Invocation, ParamLocation, ParamSpec, RequestContext, TargetType,
};
use tracing::info;

use crate::document::{enum_value_to_string, ParameterDoc};
use crate::error::{CompileError, CompileResult};
use crate::spec::{ApiSpecification, OperationDefinition};
use crate::types::{map_token, resolve_ref};

/// The only media type endpoints may produce.
pub const APPLICATION_JSON: &str = "application/json";

/// How unresolvable handler references are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerPolicy {
    /// Fail with [`CompileError::HandlerResolution`].
    #[default]
    Require,
    /// Bind a stub that answers `UNHANDLED_SERVER_ERROR`. Used to check
    /// documents without the code that implements them.
    Stub,
}

/// Executable counterpart of one operation.
#[derive(Clone)]
pub struct CompiledBinding {
    /// Owning API.
    pub api: String,
    /// HTTP method.
    pub method: Method,
    /// Route template with `basePath` applied.
    pub route: String,
    /// Path, query and form parameters, in declaration order.
    pub params: Vec<ParamSpec>,
    /// Body model, if the operation takes one.
    pub body_model: Option<String>,
    /// Handler reference.
    pub handler_name: String,
    /// Resolved handler.
    pub handler: BoxedHandler,
    /// Decorator reference, if any.
    pub decorator_name: Option<String>,
    /// Resolved decorator.
    pub decorator: Option<Decorator>,
    /// Models the handler may return.
    pub result_models: IndexSet<String>,
    /// Produced media type.
    pub produces: String,
}

impl CompiledBinding {
    /// Endpoint identity for logs and crash reports.
    #[must_use]
    pub fn endpoint_id(&self) -> EndpointId {
        EndpointId {
            api: self.api.clone(),
            method: self.method.to_string(),
            path: self.route.clone(),
            handler: self.handler_name.clone(),
        }
    }

    /// Parameters read from a given location.
    pub fn params_in(&self, location: ParamLocation) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(move |p| p.location == location)
    }

    /// Returns `true` if a handler may return `model`.
    #[must_use]
    pub fn accepts_result(&self, model: &str) -> bool {
        self.result_models.contains(model)
    }

    /// Returns `true` if the operation reads form fields.
    #[must_use]
    pub fn takes_form(&self) -> bool {
        self.params_in(ParamLocation::FormData).next().is_some()
    }
}

impl fmt::Debug for CompiledBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledBinding")
            .field("api", &self.api)
            .field("method", &self.method)
            .field("route", &self.route)
            .field("params", &self.params)
            .field("body_model", &self.body_model)
            .field("handler_name", &self.handler_name)
            .field("decorator_name", &self.decorator_name)
            .field("result_models", &self.result_models)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// Compiles every operation of a document.
pub fn compile_endpoints(
    spec: &ApiSpecification,
    handlers: &HandlerTable,
    policy: HandlerPolicy,
) -> CompileResult<Vec<CompiledBinding>> {
    let known: Vec<&str> = spec.models().keys().map(String::as_str).collect();
    spec.operations()
        .iter()
        .map(|op| compile_endpoint(spec, op, &known, handlers, policy))
        .collect()
}

fn compile_endpoint(
    spec: &ApiSpecification,
    op: &OperationDefinition<'_>,
    known: &[&str],
    handlers: &HandlerTable,
    policy: HandlerPolicy,
) -> CompileResult<CompiledBinding> {
    let label = op.label();
    let invalid = |reason: String| CompileError::invalid_operation(label.clone(), reason);

    let method = Method::from_bytes(op.method.as_bytes())
        .map_err(|e| invalid(format!("invalid method: {e}")))?;

    let mut params = Vec::new();
    let mut body_model = None;
    for param in &op.doc.parameters {
        match param.location.as_str() {
            "body" => {
                if body_model.is_some() {
                    return Err(invalid("more than one body parameter".to_string()));
                }
                let reference = param
                    .schema
                    .as_ref()
                    .and_then(|s| s.reference.as_deref())
                    .ok_or_else(|| invalid("body parameter without schema.$ref".to_string()))?;
                body_model = Some(resolve_ref(reference, known, &label)?);
            }
            "path" | "query" | "formData" => params.push(compile_param(param, known, &label)?),
            other => return Err(invalid(format!("unsupported parameter location '{other}'"))),
        }
    }

    if body_model.is_some() && params.iter().any(|p| p.location == ParamLocation::FormData) {
        return Err(invalid("cannot mix a body parameter with formData".to_string()));
    }
    check_route_tokens(op.path, &params).map_err(&invalid)?;

    let produces = op
        .doc
        .produces
        .as_ref()
        .or(spec.document().produces.as_ref())
        .and_then(|p| p.first().cloned())
        .unwrap_or_else(|| APPLICATION_JSON.to_string());
    if produces != APPLICATION_JSON {
        return Err(invalid(format!(
            "produces '{produces}', only {APPLICATION_JSON} is supported"
        )));
    }

    if op.doc.responses.is_empty() {
        return Err(invalid("no responses declared".to_string()));
    }
    let mut result_models = IndexSet::new();
    for (status, response) in &op.doc.responses {
        let reference = response
            .schema
            .as_ref()
            .and_then(|s| s.reference.as_deref())
            .ok_or_else(|| invalid(format!("response '{status}' has no schema.$ref")))?;
        result_models.insert(resolve_ref(reference, known, &label)?);
    }

    let handler_name = op
        .doc
        .handler_ref()
        .ok_or_else(|| invalid("no operationId or x-bind-server".to_string()))?
        .to_string();
    let handler = resolve_handler(handlers, &handler_name, &label, policy)?;

    let decorator = match op.doc.decorate_server.as_deref() {
        Some(name) => Some(resolve_decorator(handlers, name, &label, policy)?),
        None => None,
    };

    let route = format!("{}{}", spec.base_path(), op.path);
    info!(
        api = %spec.name(),
        method = %method,
        route = %route,
        handler = %handler_name,
        "binding endpoint"
    );

    Ok(CompiledBinding {
        api: spec.name().to_string(),
        method,
        route,
        params,
        body_model,
        handler_name,
        handler,
        decorator_name: op.doc.decorate_server.clone(),
        decorator,
        result_models,
        produces,
    })
}

fn compile_param(param: &ParameterDoc, known: &[&str], label: &str) -> CompileResult<ParamSpec> {
    let invalid = |reason: String| CompileError::invalid_operation(label, reason);
    let name = param
        .name
        .clone()
        .ok_or_else(|| invalid(format!("{} parameter without a name", param.location)))?;
    let context = format!("{label} parameter '{name}'");

    let (location, ty) = match param.location.as_str() {
        "path" => {
            let token = param.format.as_deref().or(param.ty.as_deref()).unwrap_or("string");
            let ty = map_token(token, &[], &context)?;
            if !matches!(ty, TargetType::String | TargetType::Integer | TargetType::Number) {
                return Err(invalid(format!(
                    "path parameter '{name}' must be a string, integer or number"
                )));
            }
            (ParamLocation::Path, ty)
        }
        "query" => (ParamLocation::Query, scalar_type(param, known, &context)?),
        _ if param.ty.as_deref() == Some("file") => (ParamLocation::FormData, TargetType::Bytes),
        _ => (ParamLocation::FormData, scalar_type(param, known, &context)?),
    };

    let mut spec = ParamSpec::new(name, location, ty)
        .required(location == ParamLocation::Path || param.required);
    if let Some(default) = &param.default {
        spec = spec.with_default(default.clone());
    }
    if let Some(description) = &param.description {
        spec = spec.with_description(description.as_str());
    }
    Ok(spec)
}

fn scalar_type(param: &ParameterDoc, known: &[&str], context: &str) -> CompileResult<TargetType> {
    if let Some(values) = &param.values {
        return Ok(TargetType::Enum(values.iter().map(enum_value_to_string).collect()));
    }
    let token = param
        .format
        .as_deref()
        .or(param.ty.as_deref())
        .ok_or_else(|| CompileError::UnknownType {
            token: "<none>".to_string(),
            context: context.to_string(),
        })?;
    let ty = map_token(token, known, context)?;
    if ty.is_scalar() {
        Ok(ty)
    } else {
        Err(CompileError::UnknownType {
            token: token.to_string(),
            context: context.to_string(),
        })
    }
}

fn check_route_tokens(route: &str, params: &[ParamSpec]) -> Result<(), String> {
    let tokens: Vec<&str> = route
        .split('/')
        .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
        .collect();
    for token in &tokens {
        if !params
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == *token)
        {
            return Err(format!("route token '{{{token}}}' has no path parameter"));
        }
    }
    for param in params.iter().filter(|p| p.location == ParamLocation::Path) {
        if !tokens.contains(&param.name.as_str()) {
            return Err(format!("path parameter '{}' is not in the route", param.name));
        }
    }
    Ok(())
}

fn resolve_handler(
    handlers: &HandlerTable,
    name: &str,
    label: &str,
    policy: HandlerPolicy,
) -> CompileResult<BoxedHandler> {
    if let Some(handler) = handlers.handler(name) {
        return Ok(handler.clone());
    }
    match policy {
        HandlerPolicy::Require => Err(CompileError::HandlerResolution {
            operation: label.to_string(),
            name: name.to_string(),
        }),
        HandlerPolicy::Stub => {
            let unbound = name.to_string();
            let stub: BoxedHandler = Arc::new(move |_inv: Invocation| -> BoxFuture<'static, HandlerResult> {
                let err = ApiError::unhandled(format!("no handler bound for '{unbound}'"));
                Box::pin(async move { Err(HandlerError::Api(err)) })
            });
            Ok(stub)
        }
    }
}

fn resolve_decorator(
    handlers: &HandlerTable,
    name: &str,
    label: &str,
    policy: HandlerPolicy,
) -> CompileResult<Decorator> {
    if let Some(decorator) = handlers.decorator(name) {
        return Ok(decorator.clone());
    }
    match policy {
        HandlerPolicy::Require => Err(CompileError::HandlerResolution {
            operation: label.to_string(),
            name: name.to_string(),
        }),
        HandlerPolicy::Stub => {
            let identity: Decorator =
                Arc::new(|_ctx: &RequestContext, _body: &mut serde_json::Value| {});
            Ok(identity)
        }
    }
}
