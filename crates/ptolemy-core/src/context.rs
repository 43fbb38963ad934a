//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the middleware
//! chain, the dispatcher and into handlers. It is created when a request
//! arrives and dropped once the response has been written.

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::caller::Caller;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log lines for one service sortable
/// by request id.
///
/// # Example
///
/// ```
/// use ptolemy_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID, typically one read from `x-request-id`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identity of the endpoint a request was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointId {
    /// API name the operation belongs to.
    pub api: String,
    /// HTTP method, upper case.
    pub method: String,
    /// Route template, e.g. `/item/{item_id}`.
    pub path: String,
    /// Handler reference, e.g. `items.get_item`.
    pub handler: String,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.api, self.method, self.path)
    }
}

/// Where a request currently is in the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Accepted, nothing done yet.
    Received,
    /// Reading the body and coercing parameters.
    Parsing,
    /// Running the handler.
    Invoking,
    /// Checking the handler's result against the binding.
    ValidatingResult,
    /// Writing the JSON response.
    Serializing,
    /// Response produced.
    Done,
    /// Failed; the error envelope is being produced.
    Error,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Parsing => "parsing",
            Self::Invoking => "invoking",
            Self::ValidatingResult => "validating_result",
            Self::Serializing => "serializing",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Per-request context.
///
/// # Example
///
/// ```
/// use ptolemy_core::{DispatchState, RequestContext};
///
/// let ctx = RequestContext::mock();
/// assert_eq!(ctx.state(), DispatchState::Received);
/// assert_eq!(ctx.path(), "/");
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    path_params: IndexMap<String, String>,
    caller: Caller,
    endpoint: Option<EndpointId>,
    state: DispatchState,
    started_at: Instant,
    received_at: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a context for a freshly received request.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            uri,
            headers,
            body,
            path_params: IndexMap::new(),
            caller: Caller::anonymous(),
            endpoint: None,
            state: DispatchState::Received,
            started_at: Instant::now(),
            received_at: Utc::now(),
        }
    }

    /// A `GET /` context with no headers or body, for tests.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(Method::GET, Uri::from_static("/"), HeaderMap::new(), Bytes::new())
    }

    /// Returns the request id.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Replaces the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the full request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the URI path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Returns the raw body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the path parameters captured by the router.
    #[must_use]
    pub const fn path_params(&self) -> &IndexMap<String, String> {
        &self.path_params
    }

    /// Sets the path parameters captured by the router.
    #[must_use]
    pub fn with_path_params(mut self, params: IndexMap<String, String>) -> Self {
        self.path_params = params;
        self
    }

    /// Returns the caller.
    #[must_use]
    pub const fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Returns a mutable reference to the caller.
    pub fn caller_mut(&mut self) -> &mut Caller {
        &mut self.caller
    }

    /// Sets the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    /// Returns the endpoint once routing has happened.
    #[must_use]
    pub const fn endpoint(&self) -> Option<&EndpointId> {
        self.endpoint.as_ref()
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: EndpointId) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Returns the dispatch state.
    #[must_use]
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    /// Moves to a new dispatch state, logging the transition.
    pub fn transition(&mut self, next: DispatchState) {
        tracing::debug!(
            request_id = %self.request_id,
            from = %self.state,
            to = %next,
            "dispatch state"
        );
        self.state = next;
    }

    /// Wall-clock time the request was received.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Time spent on this request so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::mock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_new_generates_unique_ids() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_request_id_serialization() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_context_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        let ctx = RequestContext::new(
            Method::POST,
            Uri::from_static("/items?limit=5"),
            headers,
            Bytes::from_static(b"{}"),
        );
        assert_eq!(ctx.path(), "/items");
        assert_eq!(ctx.query(), Some("limit=5"));
        assert_eq!(ctx.content_type(), Some("application/json"));
        assert_eq!(ctx.body().as_ref(), b"{}");
        assert!(ctx.endpoint().is_none());
    }

    #[test]
    fn test_transition_updates_state() {
        let mut ctx = RequestContext::mock();
        ctx.transition(DispatchState::Parsing);
        assert_eq!(ctx.state(), DispatchState::Parsing);
        ctx.transition(DispatchState::Error);
        assert_eq!(ctx.state(), DispatchState::Error);
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = EndpointId {
            api: "items".to_string(),
            method: "GET".to_string(),
            path: "/item/{item_id}".to_string(),
            handler: "items.get_item".to_string(),
        };
        assert_eq!(endpoint.to_string(), "items GET /item/{item_id}");
    }

    #[test]
    fn test_elapsed() {
        let ctx = RequestContext::mock();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.elapsed() >= Duration::from_millis(5));
    }
}
