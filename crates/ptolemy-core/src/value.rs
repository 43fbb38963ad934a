//! Field types and runtime values.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ModelInstance;

/// The resolved type of a model field or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TargetType {
    /// `boolean`
    Bool,
    /// `integer`, `int32`, `int64`
    Integer,
    /// `number`, `float`, `double`
    Number,
    /// `string`
    String,
    /// `date`, `date-time` and friends.
    Timestamp,
    /// Raw bytes, used for uploaded files.
    Bytes,
    /// A closed set of strings.
    Enum(Vec<String>),
    /// A model declared in the same document.
    Model(String),
    /// `collection-of(T)`
    Collection(Box<TargetType>),
}

impl TargetType {
    /// Returns the element type for collections.
    #[must_use]
    pub fn element(&self) -> Option<&TargetType> {
        match self {
            Self::Collection(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns the model this type refers to, looking through collections.
    #[must_use]
    pub fn referenced_model(&self) -> Option<&str> {
        match self {
            Self::Model(name) => Some(name),
            Self::Collection(inner) => inner.referenced_model(),
            _ => None,
        }
    }

    /// Returns `true` for types that can be parsed from a single string.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Model(_) | Self::Collection(_))
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("boolean"),
            Self::Integer => f.write_str("integer"),
            Self::Number => f.write_str("number"),
            Self::String => f.write_str("string"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Bytes => f.write_str("bytes"),
            Self::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
            Self::Model(name) => f.write_str(name),
            Self::Collection(inner) => write!(f, "list of {inner}"),
        }
    }
}

/// A runtime value held by a model field or a handler parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point number.
    Number(f64),
    /// String or enum member.
    String(String),
    /// Timestamp, always UTC.
    Timestamp(DateTime<Utc>),
    /// Raw bytes.
    Bytes(Bytes),
    /// Nested model.
    Model(ModelInstance),
    /// Collection.
    List(Vec<Value>),
}

impl Value {
    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number, widening integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a file payload.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is one.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the nested model, if this is one.
    #[must_use]
    pub const fn as_model(&self) -> Option<&ModelInstance> {
        match self {
            Self::Model(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the list, if this is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value's shape, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Bytes(_) => "bytes",
            Self::Model(_) => "model",
            Self::List(_) => "list",
        }
    }

    /// Checks that a value already built in Rust fits a field type.
    ///
    /// Nulls are handled by the caller since they depend on field presence.
    #[must_use]
    pub fn conforms_to(&self, ty: &TargetType) -> bool {
        match (ty, self) {
            (TargetType::Bool, Self::Bool(_))
            | (TargetType::Integer, Self::Integer(_))
            | (TargetType::Number, Self::Number(_) | Self::Integer(_))
            | (TargetType::String, Self::String(_))
            | (TargetType::Timestamp, Self::Timestamp(_))
            | (TargetType::Bytes, Self::Bytes(_)) => true,
            (TargetType::Enum(allowed), Self::String(s)) => allowed.iter().any(|a| a == s),
            (TargetType::Model(name), Self::Model(m)) => m.model_name() == name,
            (TargetType::Collection(inner), Self::List(items)) => {
                items.iter().all(|item| item.conforms_to(inner))
            }
            _ => false,
        }
    }

    /// Parses a single string (path segment, query value, form field) as a
    /// scalar of the given type.
    ///
    /// # Example
    ///
    /// ```
    /// use ptolemy_core::{TargetType, Value};
    ///
    /// assert_eq!(Value::parse_scalar(&TargetType::Integer, "42"), Ok(Value::Integer(42)));
    /// assert!(Value::parse_scalar(&TargetType::Integer, "forty-two").is_err());
    /// ```
    pub fn parse_scalar(ty: &TargetType, raw: &str) -> Result<Self, String> {
        match ty {
            TargetType::Bool => parse_bool(raw)
                .map(Self::Bool)
                .ok_or_else(|| format!("expected boolean, got '{raw}'")),
            TargetType::Integer => raw
                .trim()
                .parse()
                .map(Self::Integer)
                .map_err(|_| format!("expected integer, got '{raw}'")),
            TargetType::Number => raw
                .trim()
                .parse()
                .map(Self::Number)
                .map_err(|_| format!("expected number, got '{raw}'")),
            TargetType::String => Ok(Self::String(raw.to_string())),
            TargetType::Timestamp => parse_timestamp(raw)
                .map(Self::Timestamp)
                .ok_or_else(|| format!("expected timestamp, got '{raw}'")),
            TargetType::Bytes => Ok(Self::Bytes(Bytes::copy_from_slice(raw.as_bytes()))),
            TargetType::Enum(allowed) => {
                if allowed.iter().any(|a| a == raw) {
                    Ok(Self::String(raw.to_string()))
                } else {
                    Err(format!("'{raw}' is not one of [{}]", allowed.join(", ")))
                }
            }
            TargetType::Model(_) | TargetType::Collection(_) => {
                Err(format!("cannot read a {ty} from a plain string"))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<ModelInstance> for Value {
    fn from(m: ModelInstance) -> Self {
        Self::Model(m)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses the timestamp shapes accepted on input: RFC 3339, naive ISO 8601
/// (read as UTC) and plain dates (midnight UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_scalar_types() {
        assert_eq!(
            Value::parse_scalar(&TargetType::Bool, "true"),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            Value::parse_scalar(&TargetType::Number, "2.5"),
            Ok(Value::Number(2.5))
        );
        assert_eq!(
            Value::parse_scalar(&TargetType::String, "42"),
            Ok(Value::String("42".to_string()))
        );
        assert!(Value::parse_scalar(&TargetType::Bool, "maybe").is_err());
    }

    #[test]
    fn test_parse_enum() {
        let ty = TargetType::Enum(vec!["red".to_string(), "blue".to_string()]);
        assert!(Value::parse_scalar(&ty, "red").is_ok());
        let err = Value::parse_scalar(&ty, "green").unwrap_err();
        assert!(err.contains("red, blue"));
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let t = parse_timestamp("2024-03-01T10:20:30.123456Z").unwrap();
        assert_eq!(t.hour(), 10);
        assert_eq!(t.nanosecond(), 123_456_000);

        let t = parse_timestamp("2024-03-01T10:20:30+02:00").unwrap();
        assert_eq!(t.hour(), 8);

        let t = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(t.day(), 1);
        assert_eq!(t.hour(), 0);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_conforms_to_collection() {
        let ty = TargetType::Collection(Box::new(TargetType::Integer));
        assert!(Value::List(vec![Value::Integer(1), Value::Integer(2)]).conforms_to(&ty));
        assert!(!Value::List(vec![Value::String("a".into())]).conforms_to(&ty));
        assert_eq!(ty.to_string(), "list of integer");
    }

    #[test]
    fn test_referenced_model_through_collection() {
        let ty = TargetType::Collection(Box::new(TargetType::Model("Pet".to_string())));
        assert_eq!(ty.referenced_model(), Some("Pet"));
        assert!(!ty.is_scalar());
    }

    #[test]
    fn test_target_type_serde_shape() {
        let json = serde_json::to_value(TargetType::Model("Pet".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "model", "of": "Pet"}));
        let json = serde_json::to_value(TargetType::Integer).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "integer"}));
    }
}
