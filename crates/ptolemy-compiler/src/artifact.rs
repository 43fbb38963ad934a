//! On-disk cache of compiled models.
//!
//! An artifact is a JSON dump of one API's models, written as
//! `<dir>/<api>.models.json`. By default `<dir>` is the directory of the
//! source document.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use ptolemy_core::{CompiledModel, ModelSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CompileError, CompileResult};
use crate::model::compile_models;
use crate::spec::ApiSpecification;

const ARTIFACT_SUFFIX: &str = ".models.json";

/// Serialized form of an API's compiled models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// API name.
    pub api: String,
    /// Source document, if compiled from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// When the models were compiled.
    pub compiled_at: DateTime<Utc>,
    /// Models in dependency order.
    pub models: Vec<CompiledModel>,
}

impl ModelArtifact {
    /// Captures a compiled model set.
    #[must_use]
    pub fn from_models(set: &ModelSet, source: Option<&Path>) -> Self {
        Self {
            api: set.api().to_string(),
            source: source.map(Path::to_path_buf),
            compiled_at: Utc::now(),
            models: set.iter().map(|m| m.as_ref().clone()).collect(),
        }
    }

    /// Rebuilds the model set.
    #[must_use]
    pub fn into_model_set(self) -> ModelSet {
        let mut set = ModelSet::new(self.api);
        for model in self.models {
            set.insert(model);
        }
        set
    }

    /// Where the artifact of `spec` lives.
    ///
    /// Returns `None` for in-memory documents without an explicit directory.
    #[must_use]
    pub fn path_for(spec: &ApiSpecification, dir: Option<&Path>) -> Option<PathBuf> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => spec.path()?.parent()?.to_path_buf(),
        };
        Some(dir.join(format!("{}{ARTIFACT_SUFFIX}", spec.name())))
    }

    /// Writes the artifact, creating the directory if needed.
    pub fn write(&self, path: &Path) -> CompileResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CompileError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(self).map_err(|source| CompileError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|e| CompileError::io(path, e))?;
        debug!(api = %self.api, path = %path.display(), "wrote model artifact");
        Ok(())
    }

    /// Reads an artifact.
    pub fn read(path: &Path) -> CompileResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| CompileError::Artifact {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns `true` if the artifact at `path` exists and is not older than `spec`.
    #[must_use]
    pub fn is_fresh(path: &Path, spec: &ApiSpecification) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .is_ok_and(|built: SystemTime| !spec.is_stale(built))
    }

    /// Reads the artifact at `path` if it is fresh and belongs to `spec`.
    pub fn load_if_fresh(path: &Path, spec: &ApiSpecification) -> CompileResult<Option<Self>> {
        if !Self::is_fresh(path, spec) {
            return Ok(None);
        }
        let artifact = Self::read(path)?;
        Ok((artifact.api == spec.name()).then_some(artifact))
    }
}

/// Compiles the models of `spec`, reusing a fresh artifact unless `force`.
///
/// A recompiled set is written back when an artifact location is known.
pub fn load_or_compile(
    spec: &ApiSpecification,
    artifact_dir: Option<&Path>,
    force: bool,
) -> CompileResult<ModelSet> {
    let Some(path) = ModelArtifact::path_for(spec, artifact_dir) else {
        return compile_models(spec);
    };

    if !force {
        if let Some(artifact) = ModelArtifact::load_if_fresh(&path, spec)? {
            info!(api = %spec.name(), path = %path.display(), "reusing compiled models");
            return Ok(artifact.into_model_set());
        }
    }

    let set = compile_models(spec)?;
    ModelArtifact::from_models(&set, spec.path()).write(&path)?;
    info!(
        api = %spec.name(),
        models = set.len(),
        path = %path.display(),
        force,
        "compiled models"
    );
    Ok(set)
}
