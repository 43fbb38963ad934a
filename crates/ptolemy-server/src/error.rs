//! Server startup errors.
//!
//! Request-time failures never surface here: the dispatcher turns them
//! into error envelopes.

use ptolemy_compiler::CompileError;
use thiserror::Error;

/// Errors raised while building or running a server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening address is invalid or already in use.
    #[error("bind error: {0}")]
    Bind(String),

    /// I/O failure while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An API failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Two bindings claim the same method and route.
    #[error("route conflict: {method} {route} is bound twice")]
    RouteConflict {
        /// HTTP method.
        method: String,
        /// Route template.
        route: String,
    },

    /// A route template could not be turned into a matcher.
    #[error("invalid route '{route}': {details}")]
    InvalidRoute {
        /// Route template.
        route: String,
        /// What went wrong.
        details: String,
    },
}

/// Result alias for server startup.
pub type ServerResult<T> = Result<T, ServerError>;
