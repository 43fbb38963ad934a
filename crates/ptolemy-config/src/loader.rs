//! Layered configuration loading.
//!
//! Layers are merged key by key, so a later file only overrides what it
//! names. Environment overrides are applied last, then the result is
//! validated.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ptolemy_telemetry::LogFormat;
use serde_json::{Map, Value};

use crate::{ConfigError, PtolemyConfig};

/// Default prefix of override variables.
pub const ENV_PREFIX: &str = "PTOLEMY";

/// Variable naming the environment variant file.
pub const ENV_NAME_VAR: &str = "PTOLEMY_ENV";

/// Configuration loader.
///
/// Layers, later ones winning:
/// 1. defaults or a preset
/// 2. a file (`.toml`, `.json`, `.yaml`, `.yml`)
/// 3. the environment variant `<stem>.<env>.<ext>` next to it
/// 4. `.env`, read into the process environment
/// 5. `PTOLEMY__SECTION__KEY` variables
///
/// ```no_run
/// use ptolemy_config::ConfigLoader;
///
/// # fn main() -> Result<(), ptolemy_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("ptolemy.toml")?
///     .with_env_file("ptolemy.toml", None)?
///     .with_dotenv()
///     .with_env_prefix("PTOLEMY")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    base: PtolemyConfig,
    overlay: Value,
    env_prefix: Option<String>,
    files: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader holding the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: PtolemyConfig::default(),
            overlay: Value::Object(Map::new()),
            env_prefix: None,
            files: Vec::new(),
        }
    }

    /// Starts over from the defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.base = PtolemyConfig::default();
        self.overlay = Value::Object(Map::new());
        self
    }

    /// Uses [`PtolemyConfig::development`] under the file layers.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.base = PtolemyConfig::development();
        self
    }

    /// Uses [`PtolemyConfig::production`] under the file layers.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.base = PtolemyConfig::production();
        self
    }

    /// Merges a file. The format follows the extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        let layer = parse_layer(&content, format, &path.display().to_string())?;
        merge(&mut self.overlay, layer);
        self.files.push(path.to_path_buf());
        Ok(self)
    }

    /// Merges a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges the environment variant of `base`, if present.
    ///
    /// The environment name is `env`, or else `PTOLEMY_ENV`. With neither
    /// this is a no-op.
    pub fn with_env_file<P: AsRef<Path>>(
        self,
        base: P,
        env: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let name = env
            .map(str::to_string)
            .or_else(|| env::var(ENV_NAME_VAR).ok())
            .filter(|name| !name.trim().is_empty());
        match name {
            Some(name) => self.with_optional_file(variant_path(base.as_ref(), name.trim())),
            None => Ok(self),
        }
    }

    /// Merges configuration text in the named format.
    ///
    /// ```
    /// use ptolemy_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = 3000", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, Some(3000));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = parse_layer(content, format, "<string>")?;
        merge(&mut self.overlay, layer);
        Ok(self)
    }

    /// Reads a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // A missing .env is not an error.
        let _ = dotenvy::dotenv();
        self
    }

    /// Enables `PREFIX__SECTION__KEY` overrides, e.g.
    /// `PTOLEMY__SERVER__PORT=9000` or `PTOLEMY__APIS__IGNORE=legacy,admin`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Files merged so far.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Applies environment overrides and validates.
    pub fn load(self) -> Result<PtolemyConfig, ConfigError> {
        let prefix = self.env_prefix.clone();
        let mut config = self.load_unvalidated()?;

        if let Some(prefix) = prefix {
            let vars = env::vars().filter(|(k, _)| k.starts_with(&prefix));
            apply_env_vars(&mut config, vars, &prefix)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Merges the file layers onto the base without environment
    /// overrides or validation.
    pub fn load_unvalidated(self) -> Result<PtolemyConfig, ConfigError> {
        let mut merged = serde_json::to_value(&self.base)?;
        merge(&mut merged, self.overlay);
        serde_json::from_value(merged).map_err(|e| ConfigError::schema("merged layers", e))
    }
}

/// `ptolemy.toml` with `staging` gives `ptolemy.staging.toml`.
#[must_use]
pub fn variant_path(base: &Path, env: &str) -> PathBuf {
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("ptolemy");
    let name = match base.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{env}.{ext}"),
        None => format!("{stem}.{env}"),
    };
    base.with_file_name(name)
}

fn parse_layer(content: &str, format: &str, origin: &str) -> Result<Value, ConfigError> {
    let layer: Value = match format.to_lowercase().as_str() {
        "toml" => toml::from_str(content)?,
        "json" => serde_json::from_str(content)?,
        "yaml" | "yml" => serde_yaml::from_str(content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };

    // An empty YAML document parses to null.
    let layer = match layer {
        Value::Null => Value::Object(Map::new()),
        layer => layer,
    };

    // Each layer must fit the schema on its own so errors name the file.
    serde_json::from_value::<PtolemyConfig>(layer.clone())
        .map_err(|e| ConfigError::schema(origin, e))?;
    Ok(layer)
}

fn merge(target: &mut Value, layer: Value) {
    match (target, layer) {
        (Value::Object(target), Value::Object(layer)) => {
            for (key, value) in layer {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, layer) => *target = layer,
    }
}

fn apply_env_vars<I>(config: &mut PtolemyConfig, vars: I, prefix: &str) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        apply_env_var(config, &key, &value, prefix)?;
    }
    Ok(())
}

fn apply_env_var(
    config: &mut PtolemyConfig,
    key: &str,
    value: &str,
    prefix: &str,
) -> Result<(), ConfigError> {
    // PTOLEMY_ENV and friends are not overrides.
    let Some(path) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
        return Ok(());
    };

    let parts: Vec<&str> = path.split("__").collect();

    match parts.as_slice() {
        ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
        ["SERVER", "PORT"] => config.server.port = Some(parse_number(key, value)?),
        ["SERVER", "REQUEST_TIMEOUT_MS"] => {
            config.server.request_timeout_ms = parse_number(key, value)?;
        }
        ["SERVER", "BODY_TIMEOUT_MS"] => config.server.body_timeout_ms = parse_number(key, value)?,
        ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
            config.server.shutdown_timeout_secs = parse_number(key, value)?;
        }
        ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_number(key, value)?,

        ["APIS", "PATH"] => config.apis.path = PathBuf::from(value),
        ["APIS", "IGNORE"] => {
            config.apis.ignore = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        ["APIS", "BUILTIN"] => config.apis.builtin = parse_flag(key, value)?,
        ["APIS", "ARTIFACT_DIR"] => {
            config.apis.artifact_dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        ["APIS", "FORCE"] => config.apis.force = parse_flag(key, value)?,

        ["CODEC", "UNKNOWN_FIELDS"] => {
            config.codec.unknown_fields = match value.to_lowercase().as_str() {
                "reject" => ptolemy_core::UnknownFields::Reject,
                "tolerate" => ptolemy_core::UnknownFields::Tolerate,
                _ => {
                    return Err(ConfigError::env_parse_error(
                        key,
                        "expected 'reject' or 'tolerate'",
                    ))
                }
            };
        }
        ["CODEC", "TIMESTAMP_FORMAT"] => config.codec.timestamp_format = value.to_string(),

        ["REPORTING", "ENABLED"] => config.reporting.enabled = parse_flag(key, value)?,
        ["REPORTING", "SLOW_CALL_MS"] => config.reporting.slow_call_ms = parse_number(key, value)?,
        ["REPORTING", "SERVICE_NAME"] => {
            config.reporting.service_name = (!value.is_empty()).then(|| value.to_string());
        }

        ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
        ["LOGGING", "FORMAT"] => {
            config.logging.format = value
                .parse::<LogFormat>()
                .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
        }

        _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptolemy_core::UnknownFields;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, PtolemyConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_string_layers_merge_per_key() {
        let config = ConfigLoader::new()
            .with_string("[server]\nport = 3000\nrequest_timeout_ms = 500", "toml")
            .unwrap()
            .with_string(r#"{"server": {"port": 4000}}"#, "json")
            .unwrap()
            .with_string("logging:\n  level: debug\n", "yaml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.port, Some(4000));
        assert_eq!(config.server.request_timeout_ms, 500);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_preset_survives_file_layer() {
        let config = ConfigLoader::new()
            .with_development()
            .with_string("[apis]\nforce = true", "toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.apis.force);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_field_names_origin() {
        let err = ConfigLoader::new()
            .with_string("[server]\nmax_connections = 5", "toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Schema { ref origin, .. } if origin == "<string>"));
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_unsupported_format() {
        let err = ConfigLoader::new().with_string("a = 1", "ini").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_empty_yaml_is_empty_layer() {
        let config = ConfigLoader::new().with_string("", "yaml").unwrap().load().unwrap();
        assert_eq!(config, PtolemyConfig::default());
    }

    #[test]
    fn test_file_and_env_variant() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ptolemy.toml");
        let mut file = fs::File::create(&base).unwrap();
        writeln!(file, "[server]\nport = 7000\n[apis]\npath = \"services\"").unwrap();
        fs::write(dir.path().join("ptolemy.staging.toml"), "[server]\nport = 7001\n").unwrap();

        let loader = ConfigLoader::new()
            .with_file(&base)
            .unwrap()
            .with_env_file(&base, Some("staging"))
            .unwrap();
        assert_eq!(loader.files().len(), 2);

        let config = loader.load().unwrap();
        assert_eq!(config.server.port, Some(7001));
        assert_eq!(config.apis.path, PathBuf::from("services"));
    }

    #[test]
    fn test_missing_env_variant_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ptolemy.yaml");
        fs::write(&base, "apis:\n  builtin: false\n").unwrap();

        let config = ConfigLoader::new()
            .with_file(&base)
            .unwrap()
            .with_env_file(&base, Some("prod"))
            .unwrap()
            .load()
            .unwrap();
        assert!(!config.apis.builtin);
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/ptolemy.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/ptolemy.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, PtolemyConfig::default());
    }

    #[test]
    fn test_variant_path() {
        assert_eq!(
            variant_path(Path::new("/etc/ptolemy.toml"), "staging"),
            PathBuf::from("/etc/ptolemy.staging.toml")
        );
        assert_eq!(
            variant_path(Path::new("ptolemy"), "dev"),
            PathBuf::from("ptolemy.dev")
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PtolemyConfig::default();
        apply_env_vars(
            &mut config,
            vars(&[
                ("PTOLEMY__SERVER__PORT", "9000"),
                ("PTOLEMY__APIS__IGNORE", "legacy, admin,"),
                ("PTOLEMY__APIS__BUILTIN", "off"),
                ("PTOLEMY__CODEC__UNKNOWN_FIELDS", "tolerate"),
                ("PTOLEMY__REPORTING__SERVICE_NAME", "shop"),
                ("PTOLEMY__LOGGING__FORMAT", "pretty"),
                ("PTOLEMY_ENV", "staging"),
            ]),
            "PTOLEMY",
        )
        .unwrap();

        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.apis.ignore, vec!["legacy", "admin"]);
        assert!(!config.apis.builtin);
        assert_eq!(config.codec.unknown_fields, UnknownFields::Tolerate);
        assert_eq!(config.reporting.service_name.as_deref(), Some("shop"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_override_errors() {
        let mut config = PtolemyConfig::default();
        let bad_port = apply_env_var(&mut config, "PTOLEMY__SERVER__PORT", "http", "PTOLEMY");
        assert!(matches!(bad_port, Err(ConfigError::EnvParseError { .. })));

        let bad_flag = apply_env_var(&mut config, "PTOLEMY__APIS__FORCE", "maybe", "PTOLEMY");
        assert!(bad_flag.is_err());

        let unknown = apply_env_var(&mut config, "PTOLEMY__SERVER__WORKERS", "4", "PTOLEMY");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
