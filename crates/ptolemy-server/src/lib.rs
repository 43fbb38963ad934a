//! # Ptolemy Server
//!
//! Serves compiled APIs over HTTP.
//!
//! | Module | Role |
//! |--------|------|
//! | [`routes`] | route templates to bindings, 404 and 405 detection |
//! | [`dispatcher`] | parse, invoke, validate and serialize one request |
//! | [`classify`] | handler failures to the error taxonomy |
//! | [`builtin`] | the `ping` API |
//! | [`server`] | hyper accept loop, body limits, graceful shutdown |
//!
//! ## Example
//!
//! ```rust
//! use ptolemy_compiler::{ApiSpecification, Compiler};
//! use ptolemy_core::{HandlerResult, HandlerTable, Invocation, ModelRegistry, RequestContext};
//! use ptolemy_server::Dispatcher;
//!
//! async fn hello(inv: Invocation) -> HandlerResult {
//!     Ok(inv.model("Greeting")?.with("text", "hi")?.into())
//! }
//!
//! # tokio_test::block_on(async {
//! let spec = ApiSpecification::parse("hello", r##"
//! swagger: "2.0"
//! definitions:
//!   Greeting:
//!     properties:
//!       text: {type: string}
//! paths:
//!   /hello:
//!     get:
//!       operationId: hello.hello
//!       responses:
//!         "200": {schema: {$ref: "#/definitions/Greeting"}}
//! "##).unwrap();
//!
//! let handlers = HandlerTable::new().with("hello.hello", hello);
//! let mut registry = ModelRegistry::new();
//! let api = Compiler::new().compile(&spec, &mut registry, &handlers).unwrap();
//! let dispatcher = Dispatcher::builder(registry.freeze()).api(api).build().unwrap();
//!
//! let ctx = RequestContext::new(
//!     http::Method::GET,
//!     http::Uri::from_static("/hello"),
//!     http::HeaderMap::new(),
//!     bytes::Bytes::new(),
//! );
//! let response = dispatcher.dispatch(ctx).await;
//! assert_eq!(response.status(), 200);
//! assert_eq!(&response.body()[..], br#"{"text":"hi"}"#);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/ptolemy-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builtin;
pub mod classify;
mod config;
pub mod dispatcher;
mod error;
pub mod routes;
mod server;
pub mod shutdown;

pub use builtin::{ping_handlers, ping_specification, PingHook, PingInfo, PING_API};
pub use classify::{classify, classify_panic};
pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_BODY_TIMEOUT_MS, DEFAULT_HTTP_ADDR,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
    DEFAULT_SLOW_CALL_MS,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{ServerError, ServerResult};
pub use routes::{Resolution, RouteTable};
pub use server::Server;
pub use shutdown::{ConnectionTracker, ShutdownSignal};
