//! API document discovery.
//!
//! Every `*.yaml` or `*.yml` file under the API directory is a document,
//! named after its file stem, except:
//!
//! - editor droppings whose names start with `#` or `.#`;
//! - hidden files and directories;
//! - configuration files (`ptolemy.yaml`, `ptolemy.<env>.yml`, ...);
//! - names listed in `ignore`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{AppError, AppResult};

/// Stem shared by configuration files.
pub const CONFIG_FILE_STEM: &str = "ptolemy";

const DOCUMENT_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// A document found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFile {
    /// API name.
    pub name: String,
    /// Document path.
    pub path: PathBuf,
}

/// Scans `dir` for API documents, sorted by name.
pub fn discover_apis(dir: &Path, ignore: &[String]) -> AppResult<Vec<ApiFile>> {
    let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry.map_err(|source| AppError::Discovery {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = api_name(entry.path()) else {
            continue;
        };
        if ignore.iter().any(|ignored| ignored == &name) {
            debug!(api = %name, "ignoring API");
            continue;
        }
        if let Some(first) = found.get(&name) {
            return Err(AppError::DuplicateApi {
                name,
                first: first.clone(),
                second: entry.path().to_path_buf(),
            });
        }
        found.insert(name, entry.path().to_path_buf());
    }

    Ok(found
        .into_iter()
        .map(|(name, path)| ApiFile { name, path })
        .collect())
}

/// The API name of `path`, or `None` if it is not an API document.
#[must_use]
pub fn api_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('#') || file_name.starts_with(".#") {
        return None;
    }

    let extension = path.extension()?.to_str()?;
    if !DOCUMENT_EXTENSIONS.contains(&extension) {
        return None;
    }

    let stem = path.file_stem()?.to_str()?;
    if is_config_stem(stem) {
        return None;
    }
    Some(stem.to_string())
}

fn is_config_stem(stem: &str) -> bool {
    stem == CONFIG_FILE_STEM
        || stem
            .strip_prefix(CONFIG_FILE_STEM)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') && !name.starts_with(".#"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_name() {
        assert_eq!(api_name(Path::new("apis/shop.yaml")).as_deref(), Some("shop"));
        assert_eq!(api_name(Path::new("apis/shop.yml")).as_deref(), Some("shop"));
        assert_eq!(api_name(Path::new("apis/shop.json")), None);
        assert_eq!(api_name(Path::new("apis/#shop.yaml#")), None);
        assert_eq!(api_name(Path::new("apis/#shop.yaml")), None);
        assert_eq!(api_name(Path::new("apis/.#shop.yaml")), None);
        assert_eq!(api_name(Path::new("apis/ptolemy.yaml")), None);
        assert_eq!(api_name(Path::new("apis/ptolemy.staging.yml")), None);
        assert_eq!(api_name(Path::new("apis/ptolemy_admin.yaml")).as_deref(), Some("ptolemy_admin"));
    }
}
