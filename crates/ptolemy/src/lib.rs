//! # Ptolemy
//!
//! Serves OpenAPI 2.0 (Swagger) documents. Each document is compiled at
//! startup into typed models and route bindings, then every request goes
//! through the same fixed pipeline:
//!
//! ```text
//! Request → pre stages → route → parse and validate → handler
//!                                                        ↓
//! Response ← post stages ← serialize ← validate result ←─┘
//! ```
//!
//! Failures anywhere in the pipeline become JSON error envelopes with a
//! closed set of codes; server-side ones are also sent to a crash reporter.
//!
//! | Crate | Re-exported as |
//! |-------|----------------|
//! | `ptolemy-core` | [`core`] |
//! | `ptolemy-compiler` | [`compiler`] |
//! | `ptolemy-extract` | [`extract`] |
//! | `ptolemy-middleware` | [`middleware`] |
//! | `ptolemy-server` | [`server`] |
//! | `ptolemy-config` | [`config`] |
//! | `ptolemy-telemetry` | [`telemetry`] |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ptolemy::prelude::*;
//!
//! async fn get_item(inv: Invocation) -> HandlerResult {
//!     let id = inv.param_i64("item_id")?;
//!     Ok(inv.model("Item")?.with("id", id)?.with("name", "x")?.into())
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     ptolemy::cli::run(HandlerTable::new().with("items.get_item", get_item)).await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/ptolemy/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod discover;
mod error;

pub use app::{App, Service};
pub use error::{AppError, AppResult};

pub use ptolemy_compiler as compiler;
pub use ptolemy_config as config;
pub use ptolemy_core as core;
pub use ptolemy_extract as extract;
pub use ptolemy_middleware as middleware;
pub use ptolemy_server as server;
pub use ptolemy_telemetry as telemetry;

/// Common imports for writing handlers and assembling a service.
pub mod prelude {
    pub use crate::app::{App, Service};
    pub use ptolemy_config::{ConfigLoader, PtolemyConfig};
    pub use ptolemy_core::{
        ApiError, ApiResult, Caller, CrashReport, CrashReporter, ErrorKind, HandlerError,
        HandlerResult, HandlerTable, Invocation, ModelInstance, Outcome, RequestContext, Value,
    };
    pub use ptolemy_middleware::{BearerAuth, StaticTokens, TokenVerifier};
    pub use ptolemy_server::ShutdownSignal;
}
