//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The file extension or format name is not toml, json or yaml.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// A layer parsed but does not fit the schema, e.g. an unknown field.
    #[error("invalid configuration in {origin}: {reason}")]
    Schema {
        /// File path or `<string>`.
        origin: String,
        /// What serde rejected.
        reason: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new schema error.
    pub fn schema(origin: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Schema {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_culprit() {
        let err = ConfigError::file_not_found("/etc/ptolemy.toml");
        assert_eq!(err.to_string(), "configuration file not found: /etc/ptolemy.toml");

        let err = ConfigError::invalid_value("server.port", "must not be 0");
        assert!(err.to_string().contains("server.port"));

        let err = ConfigError::env_parse_error("PTOLEMY__SERVER__PORT", "expected integer");
        assert!(err.to_string().contains("PTOLEMY__SERVER__PORT"));
    }

    #[test]
    fn test_read_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::read_error("ptolemy.toml", io);
        assert!(err.source().is_some());
    }
}
