//! # Ptolemy Core
//!
//! Core types shared by every Ptolemy crate:
//!
//! - [`ApiError`] / [`ErrorKind`] - The closed error taxonomy and its JSON envelope
//! - [`CompiledModel`] / [`ModelSet`] / [`ModelInstance`] - Compiled models and their JSON codec
//! - [`ModelRegistry`] - Write-once store of compiled models, keyed by API name
//! - [`HandlerTable`] / [`Invocation`] / [`Outcome`] - Handler registration and invocation
//! - [`RequestContext`] - Per-request state
//! - [`CrashDesk`] / [`CrashReporter`] - Crash and slow-call reporting

#![doc(html_root_url = "https://docs.rs/ptolemy-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod caller;
mod context;
pub mod crash;
mod error;
mod handler;
pub mod model;
mod param;
pub mod registry;
mod value;

pub use caller::Caller;
pub use context::{DispatchState, EndpointId, RequestContext, RequestId};
pub use crash::{CrashDesk, CrashReport, CrashReporter, LogReporter};
pub use error::{ApiError, ApiResult, ErrorEnvelope, ErrorKind};
pub use handler::{
    BoxFuture, BoxedHandler, Decorator, HandlerError, HandlerResult, HandlerTable, Invocation,
    Outcome,
};
pub use model::{
    Codec, CompiledField, CompiledModel, ModelError, ModelInstance, ModelSet, Presence,
    UnknownFields, DEFAULT_TIMESTAMP_FORMAT,
};
pub use param::{ParamLocation, ParamSpec};
pub use registry::{ModelRegistry, RegistryError};
pub use value::{TargetType, Value};
