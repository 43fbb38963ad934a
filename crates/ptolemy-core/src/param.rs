//! Parameter extraction plans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::TargetType;

/// Where a parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    /// A `{name}` segment of the route.
    Path,
    /// The query string.
    Query,
    /// The request body, decoded into a model.
    Body,
    /// A url-encoded or multipart form field.
    FormData,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
            Self::FormData => "formData",
        })
    }
}

/// One parameter of an operation, resolved at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Where it comes from.
    pub location: ParamLocation,
    /// Resolved type. For body parameters this is the body model.
    pub ty: TargetType,
    /// Whether the request must carry it.
    pub required: bool,
    /// Value used when the parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// Creates a parameter with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, location: ParamLocation, ty: TargetType) -> Self {
        Self {
            name: name.into(),
            location,
            ty,
            required: location == ParamLocation::Path,
            default: None,
            description: None,
        }
    }

    /// Sets the required flag.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns `true` for an uploaded file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.location == ParamLocation::FormData && self.ty == TargetType::Bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_params_required_by_default() {
        let p = ParamSpec::new("id", ParamLocation::Path, TargetType::Integer);
        assert!(p.required);
        let q = ParamSpec::new("limit", ParamLocation::Query, TargetType::Integer);
        assert!(!q.required);
    }

    #[test]
    fn test_is_file() {
        let p = ParamSpec::new("upload", ParamLocation::FormData, TargetType::Bytes);
        assert!(p.is_file());
        let p = ParamSpec::new("name", ParamLocation::FormData, TargetType::String);
        assert!(!p.is_file());
    }

    #[test]
    fn test_location_display() {
        assert_eq!(ParamLocation::FormData.to_string(), "formData");
    }
}
