//! Registry of compiled models, keyed by API name.
//!
//! The registry is an ordinary value: it is filled while APIs are compiled at
//! startup, then frozen into an [`Arc`] and shared read-only with the
//! dispatcher. Each API name can be registered once.

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{CompiledModel, ModelSet};

/// Errors raised while registering an API's models.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The API name is already registered.
    #[error("API '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Two APIs declare a same-named model with different structure.
    #[error(
        "model '{model}' of API '{api}' conflicts with the one declared by API '{existing_api}':\n{diff}"
    )]
    DuplicateModelConflict {
        /// Model name.
        model: String,
        /// API that registered the model first.
        existing_api: String,
        /// API being registered.
        api: String,
        /// Field-level difference, `-` for the existing model and `+` for the new one.
        diff: String,
    },
}

/// API name → compiled models.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    apis: IndexMap<String, Arc<ModelSet>>,
    owners: IndexMap<String, String>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers all models of one API.
    ///
    /// Fails if the API name is taken, or if another API already declared a
    /// model of the same name with a different structure. Nothing is
    /// registered on failure.
    pub fn register(&mut self, models: ModelSet) -> Result<Arc<ModelSet>, RegistryError> {
        let api = models.api().to_string();
        if self.apis.contains_key(&api) {
            return Err(RegistryError::AlreadyRegistered(api));
        }

        for model in models.iter() {
            if let Some(existing) = self.lookup(model.name()) {
                if !existing.same_structure(model) {
                    return Err(RegistryError::DuplicateModelConflict {
                        model: model.name().to_string(),
                        existing_api: existing.api().to_string(),
                        api,
                        diff: existing.diff(model),
                    });
                }
            }
        }

        for name in models.names() {
            self.owners
                .entry(name.to_string())
                .or_insert_with(|| api.clone());
        }
        let models = Arc::new(models);
        self.apis.insert(api.clone(), Arc::clone(&models));
        tracing::debug!(api = %api, models = models.len(), "registered models");
        Ok(models)
    }

    /// Returns the models of an API.
    #[must_use]
    pub fn get(&self, api: &str) -> Option<&Arc<ModelSet>> {
        self.apis.get(api)
    }

    /// Finds a model by name across APIs. The first API to declare it wins.
    #[must_use]
    pub fn lookup(&self, model: &str) -> Option<&Arc<CompiledModel>> {
        let api = self.owners.get(model)?;
        self.apis.get(api)?.get(model)
    }

    /// Registered API names, sorted.
    #[must_use]
    pub fn api_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apis.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns `true` if the API is registered.
    #[must_use]
    pub fn contains(&self, api: &str) -> bool {
        self.apis.contains_key(api)
    }

    /// Number of registered APIs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apis.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    /// Freezes the registry for sharing across requests.
    #[must_use]
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}
