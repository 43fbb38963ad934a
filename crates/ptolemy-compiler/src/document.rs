//! Serde view of the supported OpenAPI 2.0 subset.
//!
//! Only the keys the compiler reads are declared. Anything else in the
//! document (examples, tags, security definitions...) is ignored.

use indexmap::IndexMap;
use serde::Deserialize;

/// A whole API document.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// `swagger` version. YAML may give it as a string or a number.
    pub swagger: serde_yaml::Value,
    /// `info` block.
    #[serde(default)]
    pub info: Option<InfoDoc>,
    /// Prefix for every route.
    #[serde(rename = "basePath", default)]
    pub base_path: Option<String>,
    /// Document-level default media types.
    #[serde(default)]
    pub produces: Option<Vec<String>>,
    /// Model declarations, in document order.
    #[serde(default)]
    pub definitions: IndexMap<String, ModelDoc>,
    /// Routes, in document order.
    #[serde(default)]
    pub paths: IndexMap<String, PathItemDoc>,
}

impl Document {
    /// The declared version as a string.
    #[must_use]
    pub fn version(&self) -> String {
        match &self.swagger {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => {
                let s = n.to_string();
                if s.contains('.') {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            other => format!("{other:?}"),
        }
    }
}

/// The `info` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoDoc {
    /// API title.
    #[serde(default)]
    pub title: Option<String>,
    /// API version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Free text.
    #[serde(default)]
    pub description: Option<String>,
}

/// A model declaration under `definitions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDoc {
    /// Usually `object`.
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    /// Free text.
    #[serde(default)]
    pub description: Option<String>,
    /// Properties, in document order.
    #[serde(default)]
    pub properties: IndexMap<String, PropertyDoc>,
    /// `x-parent: <module>.<Name>`; the last segment names the parent.
    #[serde(rename = "x-parent", default)]
    pub parent: Option<String>,
}

impl ModelDoc {
    /// Name of the parent model, if any.
    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        self.parent
            .as_deref()
            .and_then(|p| p.rsplit('.').next())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// A property of a model, or the `items` of an array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyDoc {
    /// `type` token.
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    /// `format` token. Wins over `type`.
    #[serde(default)]
    pub format: Option<String>,
    /// `$ref` to another model.
    #[serde(rename = "$ref", default)]
    pub reference: Option<String>,
    /// Closed set of values.
    #[serde(rename = "enum", default)]
    pub values: Option<Vec<serde_yaml::Value>>,
    /// Element declaration for arrays.
    #[serde(default)]
    pub items: Option<Box<PropertyDoc>>,
    /// `x-mandatory`
    #[serde(rename = "x-mandatory", default)]
    pub mandatory: bool,
    /// `x-nullable`
    #[serde(rename = "x-nullable", default)]
    pub nullable: bool,
    /// Free text. Ignored for structural comparison.
    #[serde(default)]
    pub description: Option<String>,
}

impl PropertyDoc {
    /// Returns `true` for `type: array`.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.ty
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("array"))
    }
}

/// One route and its operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItemDoc {
    /// `get`
    #[serde(default)]
    pub get: Option<OperationDoc>,
    /// `put`
    #[serde(default)]
    pub put: Option<OperationDoc>,
    /// `post`
    #[serde(default)]
    pub post: Option<OperationDoc>,
    /// `delete`
    #[serde(default)]
    pub delete: Option<OperationDoc>,
    /// `patch`
    #[serde(default)]
    pub patch: Option<OperationDoc>,
    /// `head`
    #[serde(default)]
    pub head: Option<OperationDoc>,
    /// `options`
    #[serde(default)]
    pub options: Option<OperationDoc>,
}

impl PathItemDoc {
    /// Declared operations with their upper-case method.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &OperationDoc)> {
        [
            ("GET", self.get.as_ref()),
            ("PUT", self.put.as_ref()),
            ("POST", self.post.as_ref()),
            ("DELETE", self.delete.as_ref()),
            ("PATCH", self.patch.as_ref()),
            ("HEAD", self.head.as_ref()),
            ("OPTIONS", self.options.as_ref()),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.map(|op| (method, op)))
    }
}

/// One HTTP method on one route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationDoc {
    /// Handler reference.
    #[serde(rename = "operationId", default)]
    pub operation_id: Option<String>,
    /// Handler reference, used when `operationId` is absent.
    #[serde(rename = "x-bind-server", default)]
    pub bind_server: Option<String>,
    /// Decorator reference.
    #[serde(rename = "x-decorate-server", default)]
    pub decorate_server: Option<String>,
    /// Short summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Parameters.
    #[serde(default)]
    pub parameters: Vec<ParameterDoc>,
    /// Produced media types.
    #[serde(default)]
    pub produces: Option<Vec<String>>,
    /// Responses by status code.
    #[serde(default)]
    pub responses: IndexMap<String, ResponseDoc>,
}

impl OperationDoc {
    /// `operationId`, else `x-bind-server`.
    #[must_use]
    pub fn handler_ref(&self) -> Option<&str> {
        self.operation_id
            .as_deref()
            .or(self.bind_server.as_deref())
    }
}

/// One operation parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterDoc {
    /// Parameter name.
    #[serde(default)]
    pub name: Option<String>,
    /// `path`, `query`, `body` or `formData`.
    #[serde(rename = "in")]
    pub location: String,
    /// `type` token.
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    /// `format` token.
    #[serde(default)]
    pub format: Option<String>,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// Value used when absent.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Closed set of values.
    #[serde(rename = "enum", default)]
    pub values: Option<Vec<serde_yaml::Value>>,
    /// Body schema.
    #[serde(default)]
    pub schema: Option<SchemaRefDoc>,
    /// Free text.
    #[serde(default)]
    pub description: Option<String>,
}

/// A response declaration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseDoc {
    /// Free text.
    #[serde(default)]
    pub description: Option<String>,
    /// Response schema.
    #[serde(default)]
    pub schema: Option<SchemaRefDoc>,
}

/// A `schema: {$ref: ...}` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaRefDoc {
    /// `$ref` to a model.
    #[serde(rename = "$ref", default)]
    pub reference: Option<String>,
}

/// Renders an enum value as the string it is matched against.
pub(crate) fn enum_value_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}
