//! Loaded API documents.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;
use tracing::info;

use crate::document::{Document, ModelDoc, OperationDoc};
use crate::error::{CompileError, CompileResult};

/// One operation of a document, with its route and method.
#[derive(Debug, Clone, Copy)]
pub struct OperationDefinition<'a> {
    /// Upper-case HTTP method.
    pub method: &'static str,
    /// Route template as declared, without `basePath`.
    pub path: &'a str,
    /// The declaration.
    pub doc: &'a OperationDoc,
}

impl OperationDefinition<'_> {
    /// `METHOD /path`, used in error messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// A loaded API document.
///
/// Immutable once loaded. The modification time decides whether compiled
/// artifacts are stale.
#[derive(Debug, Clone)]
pub struct ApiSpecification {
    name: String,
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
    document: Document,
}

impl ApiSpecification {
    /// Loads a document from disk. The API name is the file stem.
    pub fn load(path: impl AsRef<Path>) -> CompileResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Self::load_named(name, path)
    }

    /// Loads a document from disk under an explicit API name.
    pub fn load_named(name: impl Into<String>, path: impl AsRef<Path>) -> CompileResult<Self> {
        let path = path.as_ref();
        let name = name.into();
        info!(api = %name, path = %path.display(), "loading API document");

        let content = std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| CompileError::io(path, e))?;

        let mut spec = Self::parse(name, &content)?;
        spec.path = Some(path.to_path_buf());
        spec.modified = Some(modified);
        Ok(spec)
    }

    /// Parses a document held in memory.
    pub fn parse(name: impl Into<String>, yaml: &str) -> CompileResult<Self> {
        let name = name.into();
        let document: Document =
            serde_yaml::from_str(yaml).map_err(|source| CompileError::Yaml {
                api: name.clone(),
                source,
            })?;

        let version = document.version();
        if version != "2.0" {
            return Err(CompileError::UnsupportedVersion { api: name, version });
        }

        Ok(Self {
            name,
            path: None,
            modified: None,
            document,
        })
    }

    /// API name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file, if loaded from disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Source modification time, if loaded from disk.
    #[must_use]
    pub const fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// The parsed document.
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// `info.version`, if declared.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.document.info.as_ref()?.version.as_deref()
    }

    /// `basePath`, normalized to no trailing slash. Empty when absent or `/`.
    #[must_use]
    pub fn base_path(&self) -> &str {
        self.document
            .base_path
            .as_deref()
            .map_or("", |p| p.trim_end_matches('/'))
    }

    /// Declared models, in document order.
    #[must_use]
    pub fn models(&self) -> &IndexMap<String, ModelDoc> {
        &self.document.definitions
    }

    /// Declared operations, in document order.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationDefinition<'_>> {
        self.document
            .paths
            .iter()
            .flat_map(|(path, item)| {
                item.operations().map(move |(method, doc)| OperationDefinition {
                    method,
                    path: path.as_str(),
                    doc,
                })
            })
            .collect()
    }

    /// Returns `true` if something built at `built` is older than this document.
    ///
    /// Documents held in memory are never stale.
    #[must_use]
    pub fn is_stale(&self, built: SystemTime) -> bool {
        self.modified.is_some_and(|modified| built < modified)
    }
}
