//! Startup errors.

use std::path::PathBuf;

use ptolemy_compiler::CompileError;
use ptolemy_config::ConfigError;
use ptolemy_server::ServerError;
use ptolemy_telemetry::TelemetryError;
use thiserror::Error;

/// Everything that can stop a service from starting or stop it early.
///
/// None of these are served over HTTP.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An API document failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The server could not be built or bound.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Logging could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The API directory could not be scanned.
    #[error("cannot scan {path}: {source}")]
    Discovery {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: walkdir::Error,
    },

    /// Two documents map to the same API name.
    #[error("API '{name}' is defined by both {first} and {second}")]
    DuplicateApi {
        /// API name, the file stem.
        name: String,
        /// First document found.
        first: PathBuf,
        /// Second document found.
        second: PathBuf,
    },
}

/// Result alias for startup code.
pub type AppResult<T> = Result<T, AppError>;
