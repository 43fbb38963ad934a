//! Handler table and invocation types.
//!
//! Handlers are plain async functions taking an [`Invocation`] and returning
//! a [`HandlerResult`]. They are registered by reference name (the
//! `module.function` string used in `operationId` or `x-bind-server`) in a
//! [`HandlerTable`], which the compiler resolves operations against.
//!
//! # Example
//!
//! ```rust
//! use ptolemy_core::{HandlerTable, Invocation, HandlerResult, Outcome};
//!
//! async fn get_item(inv: Invocation) -> HandlerResult {
//!     let id = inv.param_i64("item_id")?;
//!     let item = inv.model("Item")?.with("id", id)?.with("name", "x")?;
//!     Ok(item.into())
//! }
//!
//! let table = HandlerTable::new().with("items.get_item", get_item);
//! assert!(table.contains("items.get_item"));
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::model::{Codec, ModelError, ModelInstance, ModelSet};
use crate::value::Value;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produced.
#[derive(Debug)]
pub enum Outcome {
    /// A model instance. Must be one of the operation's response models.
    Model(ModelInstance),
    /// A ready-made HTTP response, passed through unchanged.
    Reply(http::Response<Bytes>),
    /// Any other value. Never a valid result.
    Value(serde_json::Value),
    /// Nothing at all. Never a valid result.
    Nothing,
}

impl Outcome {
    /// Short description of the outcome, used in `BAD_RESPONSE` messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Model(m) => format!("model {}", m.model_name()),
            Self::Reply(r) => format!("reply {}", r.status()),
            Self::Value(v) => match v {
                serde_json::Value::Null => "null".to_string(),
                serde_json::Value::Bool(_) => "boolean".to_string(),
                serde_json::Value::Number(_) => "number".to_string(),
                serde_json::Value::String(_) => "string".to_string(),
                serde_json::Value::Array(_) => "array".to_string(),
                serde_json::Value::Object(_) => "object".to_string(),
            },
            Self::Nothing => "nothing".to_string(),
        }
    }
}

impl From<ModelInstance> for Outcome {
    fn from(m: ModelInstance) -> Self {
        Self::Model(m)
    }
}

impl From<http::Response<Bytes>> for Outcome {
    fn from(r: http::Response<Bytes>) -> Self {
        Self::Reply(r)
    }
}

impl From<serde_json::Value> for Outcome {
    fn from(v: serde_json::Value) -> Self {
        Self::Value(v)
    }
}

impl From<&str> for Outcome {
    fn from(s: &str) -> Self {
        Self::Value(serde_json::Value::String(s.to_string()))
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Self::Value(serde_json::Value::String(s))
    }
}

impl From<()> for Outcome {
    fn from((): ()) -> Self {
        Self::Nothing
    }
}

/// Errors a handler can fail with.
///
/// The dispatcher classifies them: API errors pass through, model errors
/// become `INTERNAL_VALIDATION_ERROR` and anything else becomes
/// `UNHANDLED_SERVER_ERROR`.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// An error of the API taxonomy.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A model built by handler code failed validation.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type returned by handlers.
pub type HandlerResult = Result<Outcome, HandlerError>;

/// Everything a handler receives for one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    ctx: RequestContext,
    body: Option<ModelInstance>,
    params: IndexMap<String, Value>,
    declared: IndexSet<String>,
    models: Arc<ModelSet>,
    codec: Codec,
}

impl Invocation {
    /// Creates an invocation.
    #[must_use]
    pub fn new(ctx: RequestContext, models: Arc<ModelSet>, codec: Codec) -> Self {
        Self {
            ctx,
            body: None,
            params: IndexMap::new(),
            declared: IndexSet::new(),
            models,
            codec,
        }
    }

    /// Sets the decoded body model.
    #[must_use]
    pub fn with_body(mut self, body: ModelInstance) -> Self {
        self.body = Some(body);
        self
    }

    /// Declares a parameter the operation accepts, whether or not a
    /// value was given.
    #[must_use]
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.declared.insert(name.into());
        self
    }

    /// Adds a named path, query or form value.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        self.declared.insert(name.clone());
        self.params.insert(name, value);
        self
    }

    /// The request context.
    #[must_use]
    pub const fn ctx(&self) -> &RequestContext {
        &self.ctx
    }

    /// The decoded body model, if the operation declares one.
    #[must_use]
    pub const fn body(&self) -> Option<&ModelInstance> {
        self.body.as_ref()
    }

    /// Takes ownership of the body model.
    pub fn take_body(&mut self) -> Option<ModelInstance> {
        self.body.take()
    }

    /// All named parameter values.
    #[must_use]
    pub const fn params(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    /// Returns a parameter, if present.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Returns a parameter that must have a value.
    ///
    /// Request input was validated before the handler runs, so every
    /// failure here is a handler bug and maps to `UNHANDLED_SERVER_ERROR`:
    /// an undeclared name, a type the parameter does not have, or an
    /// optional parameter without a value. Use the `opt_*` accessors for
    /// optional parameters.
    pub fn param_i64(&self, name: &str) -> Result<i64, ApiError> {
        self.required(name, self.opt_i64(name)?)
    }

    /// Returns a number parameter that must have a value.
    pub fn param_f64(&self, name: &str) -> Result<f64, ApiError> {
        self.required(name, self.opt_f64(name)?)
    }

    /// Returns a boolean parameter that must have a value.
    pub fn param_bool(&self, name: &str) -> Result<bool, ApiError> {
        self.required(name, self.opt_bool(name)?)
    }

    /// Returns a string parameter that must have a value.
    pub fn param_str(&self, name: &str) -> Result<&str, ApiError> {
        self.required(name, self.opt_str(name)?)
    }

    /// Returns an uploaded file that must be present.
    pub fn param_bytes(&self, name: &str) -> Result<&Bytes, ApiError> {
        self.required(name, self.opt_bytes(name)?)
    }

    /// Returns an optional integer parameter. `None` when the caller left it out.
    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>, ApiError> {
        self.typed_param(name, "integer", Value::as_i64)
    }

    /// Returns an optional number parameter.
    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>, ApiError> {
        self.typed_param(name, "number", Value::as_f64)
    }

    /// Returns an optional boolean parameter.
    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>, ApiError> {
        self.typed_param(name, "boolean", Value::as_bool)
    }

    /// Returns an optional string parameter.
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, ApiError> {
        self.typed_param(name, "string", Value::as_str)
    }

    /// Returns an optional uploaded file.
    pub fn opt_bytes(&self, name: &str) -> Result<Option<&Bytes>, ApiError> {
        self.typed_param(name, "file", Value::as_bytes)
    }

    fn required<T>(&self, name: &str, value: Option<T>) -> Result<T, ApiError> {
        value.ok_or_else(|| ApiError::unhandled(format!("optional parameter '{name}' has no value")))
    }

    fn typed_param<'a, T>(
        &'a self,
        name: &str,
        expected: &str,
        get: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, ApiError> {
        if !self.declared.contains(name) {
            return Err(ApiError::unhandled(format!(
                "operation declares no parameter '{name}'"
            )));
        }
        let Some(value) = self.params.get(name) else {
            return Ok(None);
        };
        get(value).map(Some).ok_or_else(|| {
            ApiError::unhandled(format!(
                "parameter '{name}' should be {expected}, got {}",
                value.type_name()
            ))
        })
    }

    /// Starts an empty instance of one of the API's models.
    pub fn model(&self, name: &str) -> Result<ModelInstance, ModelError> {
        self.models.instance(name)
    }

    /// Decodes JSON into one of the API's models with the server's codec.
    pub fn decode(&self, name: &str, json: &serde_json::Value) -> Result<ModelInstance, ModelError> {
        self.models.decode(name, json, &self.codec)
    }

    /// The models of the API this operation belongs to.
    #[must_use]
    pub fn models(&self) -> &Arc<ModelSet> {
        &self.models
    }

    /// The server's codec.
    #[must_use]
    pub const fn codec(&self) -> &Codec {
        &self.codec
    }
}

/// A type-erased handler.
pub type BoxedHandler = Arc<dyn Fn(Invocation) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A response decorator. It may rewrite the JSON body but never the status.
pub type Decorator = Arc<dyn Fn(&RequestContext, &mut serde_json::Value) + Send + Sync>;

/// Handlers and decorators, keyed by reference name.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: IndexMap<String, BoxedHandler>,
    decorators: IndexMap<String, Decorator>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async handler under `name`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: BoxedHandler = Arc::new(move |inv: Invocation| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(inv).await })
        });
        self.handlers.insert(name.into(), erased);
    }

    /// Builder form of [`HandlerTable::register`].
    #[must_use]
    pub fn with<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(name, handler);
        self
    }

    /// Registers a decorator under `name`.
    pub fn register_decorator<F>(&mut self, name: impl Into<String>, decorator: F)
    where
        F: Fn(&RequestContext, &mut serde_json::Value) + Send + Sync + 'static,
    {
        self.decorators.insert(name.into(), Arc::new(decorator));
    }

    /// Builder form of [`HandlerTable::register_decorator`].
    #[must_use]
    pub fn with_decorator<F>(mut self, name: impl Into<String>, decorator: F) -> Self
    where
        F: Fn(&RequestContext, &mut serde_json::Value) + Send + Sync + 'static,
    {
        self.register_decorator(name, decorator);
        self
    }

    /// Looks up a handler.
    #[must_use]
    pub fn handler(&self, name: &str) -> Option<&BoxedHandler> {
        self.handlers.get(name)
    }

    /// Looks up a decorator.
    #[must_use]
    pub fn decorator(&self, name: &str) -> Option<&Decorator> {
        self.decorators.get(name)
    }

    /// Returns `true` if a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered handler names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Adds every entry of `other`. Entries of `other` win on name clashes.
    pub fn merge(&mut self, other: HandlerTable) {
        self.handlers.extend(other.handlers);
        self.decorators.extend(other.decorators);
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("decorators", &self.decorators.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompiledField, CompiledModel, Presence};
    use crate::value::TargetType;

    fn items() -> Arc<ModelSet> {
        let mut set = ModelSet::new("items");
        set.insert(
            CompiledModel::new("Item", "items")
                .with_field(CompiledField::new("id", TargetType::Integer, Presence::Mandatory))
                .with_field(CompiledField::new("name", TargetType::String, Presence::Optional)),
        );
        Arc::new(set)
    }

    async fn get_item(inv: Invocation) -> HandlerResult {
        let id = inv.param_i64("item_id")?;
        Ok(inv.model("Item")?.with("id", id)?.with("name", "x")?.into())
    }

    #[tokio::test]
    async fn test_registered_handler_runs() {
        let table = HandlerTable::new().with("items.get_item", get_item);
        let handler = table.handler("items.get_item").unwrap();
        let inv = Invocation::new(RequestContext::mock(), items(), Codec::default())
            .with_param("item_id", Value::Integer(42));

        let outcome = handler(inv).await.unwrap();
        match outcome {
            Outcome::Model(m) => {
                assert_eq!(m.model_name(), "Item");
                assert_eq!(m.get("id"), Some(&Value::Integer(42)));
            }
            other => panic!("unexpected outcome {}", other.describe()),
        }
    }

    #[tokio::test]
    async fn test_undeclared_param_is_a_server_error() {
        let table = HandlerTable::new().with("items.get_item", get_item);
        let handler = table.handler("items.get_item").unwrap();
        let inv = Invocation::new(RequestContext::mock(), items(), Codec::default());

        match handler(inv).await {
            Err(HandlerError::Api(err)) => {
                assert_eq!(err.code(), "UNHANDLED_SERVER_ERROR");
                assert_eq!(err.status_code().as_u16(), 500);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_absent_optional_param() {
        let inv = Invocation::new(RequestContext::mock(), items(), Codec::default()).declare("limit");
        assert_eq!(inv.opt_i64("limit").unwrap(), None);
        assert_eq!(inv.param_i64("limit").unwrap_err().code(), "UNHANDLED_SERVER_ERROR");
        assert_eq!(inv.opt_i64("offset").unwrap_err().code(), "UNHANDLED_SERVER_ERROR");
    }

    #[tokio::test]
    async fn test_model_errors_convert() {
        async fn broken(inv: Invocation) -> HandlerResult {
            Ok(inv.model("Item")?.with("id", "not a number")?.into())
        }
        let table = HandlerTable::new().with("items.broken", broken);
        let inv = Invocation::new(RequestContext::mock(), items(), Codec::default());
        let result = table.handler("items.broken").unwrap()(inv).await;
        assert!(matches!(result, Err(HandlerError::Model(_))));
    }

    #[test]
    fn test_typed_param_mismatch() {
        let inv = Invocation::new(RequestContext::mock(), items(), Codec::default())
            .with_param("q", Value::String("abc".into()));
        assert_eq!(inv.param_str("q").unwrap(), "abc");
        assert_eq!(inv.opt_str("q").unwrap(), Some("abc"));
        let err = inv.param_i64("q").unwrap_err();
        assert_eq!(err.code(), "UNHANDLED_SERVER_ERROR");
        assert!(err.description().contains("should be integer, got string"));
    }

    #[test]
    fn test_merge_and_decorators() {
        let mut table = HandlerTable::new().with("a.one", get_item);
        let other = HandlerTable::new()
            .with("b.two", get_item)
            .with_decorator("b.tag", |_ctx, body| {
                body["tagged"] = serde_json::Value::Bool(true);
            });
        table.merge(other);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["a.one", "b.two"]);

        let decorator = table.decorator("b.tag").unwrap();
        let mut body = serde_json::json!({});
        decorator(&RequestContext::mock(), &mut body);
        assert_eq!(body["tagged"], true);
    }

    #[test]
    fn test_outcome_describe() {
        assert_eq!(Outcome::from("hello").describe(), "string");
        assert_eq!(Outcome::from(()).describe(), "nothing");
    }
}
