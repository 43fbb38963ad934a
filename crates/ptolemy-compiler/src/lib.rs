//! # Ptolemy Compiler
//!
//! Turns OpenAPI 2.0 documents into executable values:
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Loading | [`spec`] | [`ApiSpecification`] |
//! | Type mapping | [`types`] | [`TargetType`](ptolemy_core::TargetType) |
//! | Dependency ordering | [`resolver`] | model names, referenced models first |
//! | Model compilation | [`model`] | [`ModelSet`] |
//! | Endpoint compilation | [`endpoint`] | [`CompiledBinding`]s |
//!
//! Compiled models are registered in a [`ModelRegistry`], which rejects a
//! model redeclared by another API with a different structure.
//!
//! ## Example
//!
//! ```rust
//! use ptolemy_compiler::{ApiSpecification, Compiler};
//! use ptolemy_core::{HandlerResult, HandlerTable, Invocation, ModelRegistry};
//!
//! async fn get_item(inv: Invocation) -> HandlerResult {
//!     let id = inv.param_i64("item_id")?;
//!     Ok(inv.model("Item")?.with("id", id)?.into())
//! }
//!
//! let spec = ApiSpecification::parse("items", r##"
//! swagger: "2.0"
//! definitions:
//!   Item:
//!     properties:
//!       id: {type: integer, x-mandatory: true}
//! paths:
//!   /item/{item_id}:
//!     get:
//!       operationId: items.get_item
//!       parameters:
//!         - {in: path, name: item_id, type: integer}
//!       responses:
//!         "200": {schema: {$ref: "#/definitions/Item"}}
//! "##).unwrap();
//!
//! let handlers = HandlerTable::new().with("items.get_item", get_item);
//! let mut registry = ModelRegistry::new();
//! let api = Compiler::new().compile(&spec, &mut registry, &handlers).unwrap();
//! assert_eq!(api.bindings.len(), 1);
//! assert!(registry.contains("items"));
//! ```

#![doc(html_root_url = "https://docs.rs/ptolemy-compiler/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod artifact;
pub mod document;
pub mod endpoint;
mod error;
pub mod model;
pub mod resolver;
pub mod spec;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use ptolemy_core::{HandlerTable, ModelRegistry, ModelSet};
use tracing::info;

pub use artifact::{load_or_compile, ModelArtifact};
pub use endpoint::{compile_endpoints, CompiledBinding, HandlerPolicy, APPLICATION_JSON};
pub use error::{CompileError, CompileResult};
pub use model::compile_models;
pub use resolver::order_models;
pub use spec::{ApiSpecification, OperationDefinition};

/// A fully compiled API.
#[derive(Debug, Clone)]
pub struct CompiledApi {
    /// API name.
    pub name: String,
    /// `info.version`, if declared.
    pub version: Option<String>,
    /// Registered models.
    pub models: Arc<ModelSet>,
    /// One binding per operation.
    pub bindings: Vec<CompiledBinding>,
}

/// Compilation options.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    artifact_dir: Option<PathBuf>,
    use_artifacts: bool,
    force: bool,
    policy: HandlerPolicy,
}

impl Compiler {
    /// Compiles in memory, without artifacts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches compiled models as artifacts. With no directory they go next
    /// to each document.
    #[must_use]
    pub fn with_artifacts(mut self, dir: Option<PathBuf>) -> Self {
        self.use_artifacts = true;
        self.artifact_dir = dir;
        self
    }

    /// Recompiles even when a fresh artifact exists.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets how unresolved handler references are treated.
    #[must_use]
    pub fn with_handler_policy(mut self, policy: HandlerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compiles one document.
    ///
    /// Models are registered before endpoints are compiled, so a failing
    /// endpoint leaves the API's models registered. Callers treat every
    /// error as fatal.
    pub fn compile(
        &self,
        spec: &ApiSpecification,
        registry: &mut ModelRegistry,
        handlers: &HandlerTable,
    ) -> CompileResult<CompiledApi> {
        let set = if self.use_artifacts {
            load_or_compile(spec, self.artifact_dir.as_deref(), self.force)?
        } else {
            compile_models(spec)?
        };
        let models = registry.register(set)?;
        let bindings = compile_endpoints(spec, handlers, self.policy)?;

        info!(
            api = %spec.name(),
            models = models.len(),
            endpoints = bindings.len(),
            "compiled API"
        );

        Ok(CompiledApi {
            name: spec.name().to_string(),
            version: spec.version().map(str::to_string),
            models,
            bindings,
        })
    }
}
