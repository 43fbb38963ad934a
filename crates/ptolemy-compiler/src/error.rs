//! Compiler error types.
//!
//! Every variant is a startup failure: compile errors are never served over
//! HTTP.

use std::path::PathBuf;

use ptolemy_core::RegistryError;
use thiserror::Error;

/// Result type for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while loading or compiling an API document.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Failed to read a document or artifact.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML for the supported subset.
    #[error("failed to parse API document '{api}': {source}")]
    Yaml {
        /// API name.
        api: String,
        /// Underlying error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A compiled artifact could not be encoded or decoded.
    #[error("invalid model artifact {path}: {source}")]
    Artifact {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Only `swagger: "2.0"` documents are supported.
    #[error("API '{api}': OpenAPI version '{version}' is not supported")]
    UnsupportedVersion {
        /// API name.
        api: String,
        /// Declared version.
        version: String,
    },

    /// Models reference each other in a cycle that cannot be ordered.
    #[error("cyclic dependency between models: {}", models.join(", "))]
    CyclicDependency {
        /// Models left unordered.
        models: Vec<String>,
    },

    /// A type token is neither a primitive nor a declared model.
    #[error("unknown type '{token}' in {context}")]
    UnknownType {
        /// Offending token.
        token: String,
        /// Where it was found, e.g. `Pet.owner`.
        context: String,
    },

    /// A `$ref` does not point at a declared model.
    #[error("unresolved reference '{reference}' in {context}")]
    UnresolvedReference {
        /// The `$ref` string.
        reference: String,
        /// Where it was found.
        context: String,
    },

    /// `x-parent` names a model that does not exist.
    #[error("model '{model}' has unknown parent '{parent}'")]
    InvalidParent {
        /// Child model.
        model: String,
        /// Declared parent.
        parent: String,
    },

    /// Registration failed: duplicate API or conflicting model.
    #[error(transparent)]
    DuplicateModelConflict(#[from] RegistryError),

    /// A handler or decorator reference is not in the handler table.
    #[error("{operation}: cannot resolve '{name}' in the handler table")]
    HandlerResolution {
        /// Operation, e.g. `GET /item/{item_id}`.
        operation: String,
        /// Unresolved reference.
        name: String,
    },

    /// An operation declaration violates the supported subset.
    #[error("{operation}: {reason}")]
    InvalidOperation {
        /// Operation, e.g. `GET /item/{item_id}`.
        operation: String,
        /// What is wrong.
        reason: String,
    },
}

impl CompileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
