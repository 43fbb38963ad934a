//! Compiled models and their JSON codec.
//!
//! A [`CompiledModel`] is the executable form of one `definitions` entry:
//! a flat, ordered field list (inherited fields first) with resolved types
//! and a presence policy per field. Models of one API live together in a
//! [`ModelSet`], which is what decodes JSON into [`ModelInstance`]s, since
//! nested models have to be looked up by name.
//!
//! # Presence
//!
//! | Presence  | missing      | `null`            | on output             |
//! |-----------|--------------|-------------------|-----------------------|
//! | Mandatory | error        | error             | always present        |
//! | Nullable  | unset        | kept as `null`    | explicit null kept    |
//! | Optional  | unset        | unset             | unset is omitted      |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::value::{parse_timestamp, TargetType, Value};

/// Default timestamp format used on output, always UTC.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A model validation failure.
///
/// Paths are JSON-path-like: `$` is the model root, `$.owner.name` a nested
/// field and `$.tags[1]` a collection element.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A mandatory field is absent.
    #[error("{model}: missing mandatory field '{path}'")]
    MissingField {
        /// Model being decoded.
        model: String,
        /// Field path.
        path: String,
    },

    /// A null was given where the field does not allow it.
    #[error("{model}: field '{path}' may not be null")]
    NullNotAllowed {
        /// Model being decoded.
        model: String,
        /// Field path.
        path: String,
    },

    /// The input carries a field the model does not declare.
    #[error("{model}: unknown field '{path}'")]
    UnknownField {
        /// Model being decoded.
        model: String,
        /// Field path.
        path: String,
    },

    /// The value does not have the declared type.
    #[error("'{path}': expected {expected}, got {found}")]
    TypeMismatch {
        /// Field path.
        path: String,
        /// Declared type.
        expected: String,
        /// What was found instead.
        found: String,
    },

    /// A string outside of the declared enum values.
    #[error("'{path}': '{value}' is not one of [{allowed}]")]
    InvalidEnum {
        /// Field path.
        path: String,
        /// Rejected value.
        value: String,
        /// Comma-separated allowed values.
        allowed: String,
    },

    /// The model name is not part of this API.
    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

/// How a field behaves when absent or null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// `x-mandatory: true`
    Mandatory,
    /// `x-nullable: true`
    Nullable,
    /// Neither flag.
    Optional,
}

impl Presence {
    /// Resolves the two vendor flags. Mandatory wins when both are set.
    #[must_use]
    pub const fn from_flags(mandatory: bool, nullable: bool) -> Self {
        if mandatory {
            Self::Mandatory
        } else if nullable {
            Self::Nullable
        } else {
            Self::Optional
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mandatory => "mandatory",
            Self::Nullable => "nullable",
            Self::Optional => "optional",
        })
    }
}

/// One field of a compiled model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledField {
    /// Field name, as it appears in JSON.
    pub name: String,
    /// Resolved type.
    pub ty: TargetType,
    /// Presence policy.
    pub presence: Presence,
    /// Free-text description. Ignored for structural comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `true` when the field comes from the parent model.
    #[serde(default)]
    pub inherited: bool,
}

impl CompiledField {
    /// Creates an own (non-inherited) field.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TargetType, presence: Presence) -> Self {
        Self {
            name: name.into(),
            ty,
            presence,
            description: None,
            inherited: false,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn shape(&self) -> String {
        format!("{}: {} ({})", self.name, self.ty, self.presence)
    }
}

/// Executable counterpart of a model declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModel {
    name: String,
    api: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    fields: Vec<CompiledField>,
}

impl CompiledModel {
    /// Creates an empty model owned by `api`.
    #[must_use]
    pub fn new(name: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api: api.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Inherits from `parent`: its fields are copied first, marked inherited.
    ///
    /// Must be called before any own field is added.
    #[must_use]
    pub fn with_parent(mut self, parent: &CompiledModel) -> Self {
        self.parent = Some(parent.name.clone());
        let mut inherited: Vec<CompiledField> = parent
            .fields
            .iter()
            .cloned()
            .map(|mut f| {
                f.inherited = true;
                f
            })
            .collect();
        inherited.append(&mut self.fields);
        self.fields = inherited;
        self
    }

    /// Adds a field. A field with the same name as an inherited one
    /// overrides it in place.
    #[must_use]
    pub fn with_field(mut self, field: CompiledField) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning API name.
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Parent model name, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// All fields, inherited first.
    #[must_use]
    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that came from the parent model.
    #[must_use]
    pub fn base_fields(&self) -> Vec<&CompiledField> {
        self.fields.iter().filter(|f| f.inherited).collect()
    }

    /// Declared field names, in order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Names of the fields that accept an explicit null.
    #[must_use]
    pub fn nullable_field_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.presence == Presence::Nullable)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Structural shape used to compare models across APIs: field names,
    /// types and presence. Descriptions and field order are ignored.
    #[must_use]
    pub fn structure(&self) -> BTreeMap<&str, (&TargetType, Presence)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), (&f.ty, f.presence)))
            .collect()
    }

    /// Returns `true` when both models have the same structure.
    #[must_use]
    pub fn same_structure(&self, other: &CompiledModel) -> bool {
        self.structure() == other.structure()
    }

    /// Human-readable difference between two models, one line per field.
    ///
    /// Lines start with `-` for fields only (or differently) in `self` and
    /// `+` for fields only (or differently) in `other`. Empty when the
    /// structures match.
    #[must_use]
    pub fn diff(&self, other: &CompiledModel) -> String {
        let mut lines = Vec::new();
        for field in &self.fields {
            match other.field(&field.name) {
                Some(theirs) if theirs.ty == field.ty && theirs.presence == field.presence => {}
                Some(theirs) => {
                    lines.push(format!("- {}", field.shape()));
                    lines.push(format!("+ {}", theirs.shape()));
                }
                None => lines.push(format!("- {}", field.shape())),
            }
        }
        for field in &other.fields {
            if self.field(&field.name).is_none() {
                lines.push(format!("+ {}", field.shape()));
            }
        }
        lines.join("\n")
    }
}

/// What to do with input fields a model does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFields {
    /// Fail with [`ModelError::UnknownField`].
    #[default]
    Reject,
    /// Drop them silently.
    Tolerate,
}

type TimestampEncoder = Arc<dyn Fn(&DateTime<Utc>) -> String + Send + Sync>;

/// JSON encoding and decoding policy shared by all models.
#[derive(Clone)]
pub struct Codec {
    unknown_fields: UnknownFields,
    encoder: TimestampEncoder,
}

impl Codec {
    /// Rejects unknown fields and writes timestamps with
    /// [`DEFAULT_TIMESTAMP_FORMAT`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the unknown-field policy.
    #[must_use]
    pub fn with_unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Writes timestamps with a `chrono` format string.
    #[must_use]
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        self.encoder = Arc::new(move |t| t.format(&format).to_string());
        self
    }

    /// Writes timestamps with an arbitrary function.
    #[must_use]
    pub fn with_encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Unknown-field policy.
    #[must_use]
    pub const fn unknown_fields(&self) -> UnknownFields {
        self.unknown_fields
    }

    /// Encodes a timestamp.
    #[must_use]
    pub fn encode_timestamp(&self, t: &DateTime<Utc>) -> String {
        (self.encoder)(t)
    }

    /// Encodes a value with this codec's policy.
    #[must_use]
    pub fn encode(&self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(n) => Json::from(*n),
            Value::Number(n) => Json::from(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Timestamp(t) => Json::String(self.encode_timestamp(t)),
            Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
            Value::Model(m) => m.to_json(self),
            Value::List(items) => Json::Array(items.iter().map(|v| self.encode(v)).collect()),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            unknown_fields: UnknownFields::Reject,
            encoder: Arc::new(|t| t.format(DEFAULT_TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("unknown_fields", &self.unknown_fields)
            .finish_non_exhaustive()
    }
}

/// A value of a compiled model.
///
/// Only set fields are stored. A nullable field explicitly set to null holds
/// [`Value::Null`]; an unset field is simply absent.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    model: Arc<CompiledModel>,
    values: IndexMap<String, Value>,
}

impl ModelInstance {
    /// Creates an instance with no field set.
    #[must_use]
    pub fn new(model: Arc<CompiledModel>) -> Self {
        Self {
            model,
            values: IndexMap::new(),
        }
    }

    /// The model this is an instance of.
    #[must_use]
    pub fn model(&self) -> &Arc<CompiledModel> {
        &self.model
    }

    /// Shorthand for `self.model().name()`.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Returns a field's value, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns `true` if the field is set (possibly to null).
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Sets a field, checking its name, type and presence.
    ///
    /// Setting an optional field to null unsets it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let value = value.into();
        let path = format!("$.{name}");
        let field = self.model.field(name).ok_or_else(|| ModelError::UnknownField {
            model: self.model.name.clone(),
            path: path.clone(),
        })?;

        if value.is_null() {
            return match field.presence {
                Presence::Mandatory => Err(ModelError::NullNotAllowed {
                    model: self.model.name.clone(),
                    path,
                }),
                Presence::Nullable => {
                    self.values.insert(name.to_string(), Value::Null);
                    Ok(())
                }
                Presence::Optional => {
                    self.values.shift_remove(name);
                    Ok(())
                }
            };
        }

        if !value.conforms_to(&field.ty) {
            return Err(ModelError::TypeMismatch {
                path,
                expected: field.ty.to_string(),
                found: value.type_name().to_string(),
            });
        }
        let value = match (&field.ty, value) {
            (TargetType::Number, Value::Integer(n)) => Value::Number(n as f64),
            (_, v) => v,
        };
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Builder form of [`ModelInstance::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, ModelError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Unsets a field.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    /// Checks that every mandatory field is set, recursing into nested models.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.validate_at("$")
    }

    fn validate_at(&self, path: &str) -> Result<(), ModelError> {
        for field in &self.model.fields {
            let field_path = format!("{path}.{}", field.name);
            match self.values.get(&field.name) {
                None if field.presence == Presence::Mandatory => {
                    return Err(ModelError::MissingField {
                        model: self.model.name.clone(),
                        path: field_path,
                    });
                }
                Some(value) => validate_nested(value, &field_path)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Serializes with the omission and null-preservation policy.
    #[must_use]
    pub fn to_json(&self, codec: &Codec) -> Json {
        let mut out = Map::new();
        for field in &self.model.fields {
            if let Some(value) = self.values.get(&field.name) {
                out.insert(field.name.clone(), codec.encode(value));
            }
        }
        Json::Object(out)
    }
}

fn validate_nested(value: &Value, path: &str) -> Result<(), ModelError> {
    match value {
        Value::Model(m) => m.validate_at(path),
        Value::List(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| validate_nested(item, &format!("{path}[{i}]"))),
        _ => Ok(()),
    }
}

impl PartialEq for ModelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.model.name == other.model.name
            && self.model.api == other.model.api
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .all(|(k, v)| other.values.get(k).is_some_and(|o| o == v))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Lenient,
}

/// All compiled models of one API.
#[derive(Debug, Clone, Default)]
pub struct ModelSet {
    api: String,
    models: IndexMap<String, Arc<CompiledModel>>,
}

impl ModelSet {
    /// Creates an empty set for `api`.
    #[must_use]
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            models: IndexMap::new(),
        }
    }

    /// Adds a model, replacing any model with the same name.
    pub fn insert(&mut self, model: CompiledModel) -> Arc<CompiledModel> {
        let model = Arc::new(model);
        self.models.insert(model.name.clone(), Arc::clone(&model));
        model
    }

    /// API name.
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Looks up a model.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<CompiledModel>> {
        self.models.get(name)
    }

    /// Returns `true` if the set declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Model names in compilation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Models in compilation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompiledModel>> {
        self.models.values()
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Starts an empty instance of `name`.
    pub fn instance(&self, name: &str) -> Result<ModelInstance, ModelError> {
        self.get(name)
            .map(|m| ModelInstance::new(Arc::clone(m)))
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// Decodes strict JSON into an instance of `name`.
    pub fn decode(&self, name: &str, json: &Json, codec: &Codec) -> Result<ModelInstance, ModelError> {
        self.decode_model(name, json, "$", Mode::Strict, codec)
    }

    /// Decodes form input into an instance of `name`.
    ///
    /// Scalars given as strings are coerced to the declared type. `files`
    /// are set before the form fields are read; a file sent for a field
    /// that is not declared as bytes is a type mismatch.
    pub fn decode_form(
        &self,
        name: &str,
        fields: &Json,
        files: IndexMap<String, Bytes>,
        codec: &Codec,
    ) -> Result<ModelInstance, ModelError> {
        let mut fields = fields.clone();
        if let Json::Object(map) = &mut fields {
            for file_name in files.keys() {
                map.remove(file_name);
            }
        }
        let mut preset = self.instance(name)?;
        for (file_name, bytes) in files {
            if preset.model.field(&file_name).is_some() {
                preset.set(&file_name, Value::Bytes(bytes))?;
            }
        }
        let decoded = self.decode_model_with(preset, &fields, "$", Mode::Lenient, codec)?;
        Ok(decoded)
    }

    fn decode_model(
        &self,
        name: &str,
        json: &Json,
        path: &str,
        mode: Mode,
        codec: &Codec,
    ) -> Result<ModelInstance, ModelError> {
        let instance = self.instance(name)?;
        self.decode_model_with(instance, json, path, mode, codec)
    }

    fn decode_model_with(
        &self,
        mut instance: ModelInstance,
        json: &Json,
        path: &str,
        mode: Mode,
        codec: &Codec,
    ) -> Result<ModelInstance, ModelError> {
        let model = Arc::clone(&instance.model);
        let object = json.as_object().ok_or_else(|| ModelError::TypeMismatch {
            path: path.to_string(),
            expected: model.name.clone(),
            found: json_type_name(json).to_string(),
        })?;

        if codec.unknown_fields() == UnknownFields::Reject {
            if let Some(unknown) = object.keys().find(|k| model.field(k).is_none()) {
                return Err(ModelError::UnknownField {
                    model: model.name.clone(),
                    path: format!("{path}.{unknown}"),
                });
            }
        }

        for field in &model.fields {
            let field_path = format!("{path}.{}", field.name);
            match object.get(&field.name) {
                None => {
                    if field.presence == Presence::Mandatory && !instance.is_set(&field.name) {
                        return Err(ModelError::MissingField {
                            model: model.name.clone(),
                            path: field_path,
                        });
                    }
                }
                Some(Json::Null) => match field.presence {
                    Presence::Mandatory => {
                        return Err(ModelError::NullNotAllowed {
                            model: model.name.clone(),
                            path: field_path,
                        });
                    }
                    Presence::Nullable => {
                        instance.values.insert(field.name.clone(), Value::Null);
                    }
                    Presence::Optional => {}
                },
                Some(raw) => {
                    let value = self.decode_value(&field.ty, raw, &field_path, mode, codec)?;
                    instance.values.insert(field.name.clone(), value);
                }
            }
        }
        Ok(instance)
    }

    fn decode_value(
        &self,
        ty: &TargetType,
        json: &Json,
        path: &str,
        mode: Mode,
        codec: &Codec,
    ) -> Result<Value, ModelError> {
        let mismatch = || ModelError::TypeMismatch {
            path: path.to_string(),
            expected: ty.to_string(),
            found: json_type_name(json).to_string(),
        };

        if mode == Mode::Lenient && ty.is_scalar() {
            if let Json::String(s) = json {
                return Value::parse_scalar(ty, s).map_err(|_| match ty {
                    TargetType::Enum(allowed) => ModelError::InvalidEnum {
                        path: path.to_string(),
                        value: s.clone(),
                        allowed: allowed.join(", "),
                    },
                    _ => mismatch(),
                });
            }
        }

        match ty {
            TargetType::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            TargetType::Integer => json.as_i64().map(Value::Integer).ok_or_else(mismatch),
            TargetType::Number => json.as_f64().map(Value::Number).ok_or_else(mismatch),
            TargetType::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            TargetType::Timestamp => json
                .as_str()
                .and_then(parse_timestamp)
                .map(Value::Timestamp)
                .ok_or_else(mismatch),
            TargetType::Bytes => json
                .as_str()
                .map(|s| Value::Bytes(Bytes::copy_from_slice(s.as_bytes())))
                .ok_or_else(mismatch),
            TargetType::Enum(allowed) => {
                let s = json.as_str().ok_or_else(mismatch)?;
                if allowed.iter().any(|a| a == s) {
                    Ok(Value::String(s.to_string()))
                } else {
                    Err(ModelError::InvalidEnum {
                        path: path.to_string(),
                        value: s.to_string(),
                        allowed: allowed.join(", "),
                    })
                }
            }
            TargetType::Model(name) => self
                .decode_model(name, json, path, mode, codec)
                .map(Value::Model),
            TargetType::Collection(inner) => {
                let items = json.as_array().ok_or_else(mismatch)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let item_path = format!("{path}[{i}]");
                        if item.is_null() {
                            return Err(ModelError::NullNotAllowed {
                                model: inner.to_string(),
                                path: item_path,
                            });
                        }
                        self.decode_value(inner, item, &item_path, mode, codec)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
        }
    }
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn pets() -> ModelSet {
        let mut set = ModelSet::new("pets");
        set.insert(
            CompiledModel::new("Tag", "pets")
                .with_field(CompiledField::new("label", TargetType::String, Presence::Mandatory)),
        );
        let base = set.insert(
            CompiledModel::new("Animal", "pets")
                .with_field(CompiledField::new("id", TargetType::Integer, Presence::Mandatory)),
        );
        set.insert(
            CompiledModel::new("Pet", "pets")
                .with_parent(&base)
                .with_field(CompiledField::new("name", TargetType::String, Presence::Mandatory))
                .with_field(CompiledField::new("nickname", TargetType::String, Presence::Nullable))
                .with_field(CompiledField::new("age", TargetType::Integer, Presence::Optional))
                .with_field(CompiledField::new("weight", TargetType::Number, Presence::Optional))
                .with_field(CompiledField::new("born", TargetType::Timestamp, Presence::Optional))
                .with_field(CompiledField::new(
                    "color",
                    TargetType::Enum(vec!["black".into(), "white".into()]),
                    Presence::Optional,
                ))
                .with_field(CompiledField::new(
                    "tags",
                    TargetType::Collection(Box::new(TargetType::Model("Tag".into()))),
                    Presence::Optional,
                )),
        );
        set
    }

    #[test]
    fn test_presence_mandatory_wins() {
        assert_eq!(Presence::from_flags(true, true), Presence::Mandatory);
        assert_eq!(Presence::from_flags(false, true), Presence::Nullable);
        assert_eq!(Presence::from_flags(false, false), Presence::Optional);
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let set = pets();
        let pet = set.get("Pet").unwrap();
        assert_eq!(pet.parent(), Some("Animal"));
        assert_eq!(pet.field_names()[..2], ["id", "name"]);
        assert_eq!(pet.base_fields().len(), 1);
        assert_eq!(pet.nullable_field_names(), vec!["nickname"]);
    }

    #[test]
    fn test_missing_mandatory_field_fails() {
        let set = pets();
        let err = set
            .decode("Pet", &json!({"id": 1}), &Codec::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField { ref path, .. } if path == "$.name"));
    }

    #[test]
    fn test_null_on_mandatory_fails() {
        let set = pets();
        let err = set
            .decode("Pet", &json!({"id": 1, "name": null}), &Codec::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::NullNotAllowed { .. }));
    }

    #[test]
    fn test_nullable_null_is_kept() {
        let set = pets();
        let codec = Codec::default();
        let pet = set
            .decode("Pet", &json!({"id": 1, "name": "rex", "nickname": null}), &codec)
            .unwrap();
        assert_eq!(pet.get("nickname"), Some(&Value::Null));
        assert_eq!(
            pet.to_json(&codec),
            json!({"id": 1, "name": "rex", "nickname": null})
        );
    }

    #[test]
    fn test_optional_null_and_missing_are_unset() {
        let set = pets();
        let codec = Codec::default();
        let pet = set
            .decode("Pet", &json!({"id": 1, "name": "rex", "age": null}), &codec)
            .unwrap();
        assert!(!pet.is_set("age"));
        assert!(!pet.is_set("weight"));
        let out = pet.to_json(&codec);
        assert!(out.get("age").is_none());
        assert!(out.get("weight").is_none());
    }

    #[test]
    fn test_round_trip_keeps_set_fields() {
        let set = pets();
        let codec = Codec::default();
        let input = json!({
            "id": 7,
            "name": "rex",
            "weight": 12.5,
            "born": "2020-01-02T03:04:05.000006Z",
            "color": "black",
            "tags": [{"label": "good"}]
        });
        let pet = set.decode("Pet", &input, &codec).unwrap();
        let out = pet.to_json(&codec);
        assert_eq!(out, input);
        let again = set.decode("Pet", &out, &codec).unwrap();
        assert_eq!(again, pet);
    }

    #[test]
    fn test_unknown_fields_policy() {
        let set = pets();
        let input = json!({"id": 1, "name": "rex", "owner": "bob"});
        let err = set.decode("Pet", &input, &Codec::default()).unwrap_err();
        assert!(matches!(err, ModelError::UnknownField { ref path, .. } if path == "$.owner"));

        let tolerant = Codec::default().with_unknown_fields(UnknownFields::Tolerate);
        let pet = set.decode("Pet", &input, &tolerant).unwrap();
        assert!(!pet.is_set("owner"));
    }

    #[test]
    fn test_type_mismatch_reports_path() {
        let set = pets();
        let err = set
            .decode("Pet", &json!({"id": "one", "name": "rex"}), &Codec::default())
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::TypeMismatch {
                path: "$.id".to_string(),
                expected: "integer".to_string(),
                found: "string".to_string(),
            }
        );

        let err = set
            .decode(
                "Pet",
                &json!({"id": 1, "name": "rex", "tags": [{"label": 3}]}),
                &Codec::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { ref path, .. } if path == "$.tags[0].label"));
    }

    #[test]
    fn test_invalid_enum() {
        let set = pets();
        let err = set
            .decode("Pet", &json!({"id": 1, "name": "rex", "color": "red"}), &Codec::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidEnum { .. }));
    }

    #[test]
    fn test_form_decoding_is_lenient() {
        let set = pets();
        let pet = set
            .decode_form(
                "Pet",
                &json!({"id": "3", "name": "rex", "weight": "4.5"}),
                IndexMap::new(),
                &Codec::default(),
            )
            .unwrap();
        assert_eq!(pet.get("id"), Some(&Value::Integer(3)));
        assert_eq!(pet.get("weight"), Some(&Value::Number(4.5)));
    }

    #[test]
    fn test_form_files_must_target_bytes_fields() {
        let mut set = pets();
        set.insert(
            CompiledModel::new("Photo", "pets")
                .with_field(CompiledField::new("data", TargetType::Bytes, Presence::Mandatory))
                .with_field(CompiledField::new("caption", TargetType::String, Presence::Optional)),
        );

        let files = IndexMap::from([("data".to_string(), Bytes::from_static(b"\x89PNG"))]);
        let photo = set
            .decode_form("Photo", &json!({"caption": "cat"}), files, &Codec::default())
            .unwrap();
        assert_eq!(photo.get("data"), Some(&Value::Bytes(Bytes::from_static(b"\x89PNG"))));

        let files = IndexMap::from([("caption".to_string(), Bytes::from_static(b"cat"))]);
        let err = set
            .decode_form("Photo", &json!({}), files, &Codec::default())
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::TypeMismatch {
                path: "$.caption".to_string(),
                expected: "string".to_string(),
                found: "bytes".to_string(),
            }
        );
    }

    #[test]
    fn test_set_checks_type_and_presence() {
        let set = pets();
        let mut pet = set.instance("Pet").unwrap();
        pet.set("id", 5_i64).unwrap();
        assert!(pet.set("id", "five").is_err());
        assert!(pet.set("name", Value::Null).is_err());
        assert!(pet.set("unknown", 1_i64).is_err());
        assert!(pet.validate().is_err());
        pet.set("name", "rex").unwrap();
        pet.set("weight", 3_i64).unwrap();
        assert_eq!(pet.get("weight"), Some(&Value::Number(3.0)));
        assert!(pet.validate().is_ok());
    }

    #[test]
    fn test_custom_timestamp_encoder() {
        let set = pets();
        let born = Utc.with_ymd_and_hms(2021, 5, 6, 7, 8, 9).unwrap();
        let pet = set
            .instance("Pet")
            .and_then(|p| p.with("id", 1_i64))
            .and_then(|p| p.with("name", "rex"))
            .and_then(|p| p.with("born", born))
            .unwrap();

        let default = pet.to_json(&Codec::default());
        assert_eq!(default["born"], "2021-05-06T07:08:09.000000Z");

        let custom = Codec::default().with_timestamp_format("%Y-%m-%d");
        assert_eq!(pet.to_json(&custom)["born"], "2021-05-06");
    }

    #[test]
    fn test_structure_ignores_descriptions() {
        let a = CompiledModel::new("Widget", "a").with_field(
            CompiledField::new("size", TargetType::Integer, Presence::Optional)
                .with_description("how big"),
        );
        let b = CompiledModel::new("Widget", "b")
            .with_field(CompiledField::new("size", TargetType::Integer, Presence::Optional));
        assert!(a.same_structure(&b));
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_diff_lists_changed_fields() {
        let a = CompiledModel::new("Widget", "a")
            .with_field(CompiledField::new("size", TargetType::Integer, Presence::Optional));
        let b = CompiledModel::new("Widget", "b")
            .with_field(CompiledField::new("size", TargetType::String, Presence::Optional))
            .with_field(CompiledField::new("color", TargetType::String, Presence::Optional));
        let diff = a.diff(&b);
        assert!(diff.contains("- size: integer (optional)"));
        assert!(diff.contains("+ size: string (optional)"));
        assert!(diff.contains("+ color: string (optional)"));
    }

    #[test]
    fn test_unknown_model() {
        let set = pets();
        assert_eq!(
            set.decode("Ghost", &json!({}), &Codec::default()).unwrap_err(),
            ModelError::UnknownModel("Ghost".to_string())
        );
    }
}
