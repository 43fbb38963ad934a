//! Named parameters: route segments, query string and form fields.

use std::borrow::Cow;

use indexmap::IndexMap;
use ptolemy_core::{ParamLocation, ParamSpec, Value};
use serde_json::{Map, Value as Json};

use crate::body::Payload;
use crate::error::{ExtractionError, ExtractionResult, ExtractionSource};

/// Raw inputs parameters are read from.
#[derive(Debug, Clone, Copy)]
pub struct ParamSources<'a> {
    /// Route segments captured by the router.
    pub path: &'a IndexMap<String, String>,
    /// Parsed query string.
    pub query: &'a Map<String, Json>,
    /// Decoded body, for form fields.
    pub payload: Option<&'a Payload>,
}

/// Coerces every path, query and form parameter to its declared type.
///
/// Route segments are percent-decoded first.
///
/// Absent optional parameters take their default, or are left out.
/// Body parameters are skipped: the body is decoded into its model
/// separately.
pub fn extract_params(
    specs: &[ParamSpec],
    sources: ParamSources<'_>,
) -> ExtractionResult<IndexMap<String, Value>> {
    let mut values = IndexMap::with_capacity(specs.len());
    for spec in specs {
        let value = match spec.location {
            ParamLocation::Path => {
                let raw = sources
                    .path
                    .get(&spec.name)
                    .ok_or_else(|| ExtractionError::missing(ExtractionSource::Path, &spec.name))?;
                let decoded = urlencoding::decode(raw).map_err(|e| {
                    ExtractionError::invalid_type(ExtractionSource::Path, &spec.name, e)
                })?;
                Some(coerce(spec, &decoded, ExtractionSource::Path)?)
            }
            ParamLocation::Query => {
                let raw = sources.query.get(&spec.name).and_then(raw_string);
                lookup(spec, raw, ExtractionSource::Query)?
            }
            ParamLocation::FormData if spec.is_file() => {
                match sources.payload.and_then(|p| p.files.get(&spec.name)) {
                    Some(bytes) => Some(Value::Bytes(bytes.clone())),
                    None if spec.required => {
                        return Err(ExtractionError::missing(ExtractionSource::Form, &spec.name))
                    }
                    None => None,
                }
            }
            ParamLocation::FormData => {
                let raw = sources
                    .payload
                    .and_then(|p| p.fields.get(&spec.name))
                    .and_then(raw_string);
                lookup(spec, raw, ExtractionSource::Form)?
            }
            ParamLocation::Body => None,
        };
        if let Some(value) = value {
            values.insert(spec.name.clone(), value);
        }
    }
    Ok(values)
}

fn lookup(
    spec: &ParamSpec,
    raw: Option<Cow<'_, str>>,
    source: ExtractionSource,
) -> ExtractionResult<Option<Value>> {
    if let Some(raw) = raw {
        return coerce(spec, &raw, source).map(Some);
    }
    if let Some(default) = spec.default.as_ref().and_then(raw_string) {
        return coerce(spec, &default, source).map(Some);
    }
    if spec.required {
        return Err(ExtractionError::missing(source, &spec.name));
    }
    Ok(None)
}

fn coerce(spec: &ParamSpec, raw: &str, source: ExtractionSource) -> ExtractionResult<Value> {
    Value::parse_scalar(&spec.ty, raw)
        .map_err(|details| ExtractionError::invalid_type(source, &spec.name, details))
}

fn raw_string(value: &Json) -> Option<Cow<'_, str>> {
    match value {
        Json::String(s) => Some(Cow::Borrowed(s.as_str())),
        Json::Bool(b) => Some(Cow::Owned(b.to_string())),
        Json::Number(n) => Some(Cow::Owned(n.to_string())),
        Json::Null | Json::Array(_) | Json::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ptolemy_core::TargetType;
    use serde_json::json;

    use crate::body::BodyKind;

    fn path(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn query(value: Json) -> Map<String, Json> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_path_and_query_are_coerced() {
        let specs = vec![
            ParamSpec::new("item_id", ParamLocation::Path, TargetType::Integer),
            ParamSpec::new("verbose", ParamLocation::Query, TargetType::Bool),
            ParamSpec::new("page", ParamLocation::Query, TargetType::Integer).with_default(json!(1)),
            ParamSpec::new("q", ParamLocation::Query, TargetType::String),
        ];
        let path = path(&[("item_id", "42")]);
        let query = query(json!({"verbose": "yes"}));
        let values = extract_params(
            &specs,
            ParamSources {
                path: &path,
                query: &query,
                payload: None,
            },
        )
        .unwrap();
        assert_eq!(values["item_id"], Value::Integer(42));
        assert_eq!(values["verbose"], Value::Bool(true));
        assert_eq!(values["page"], Value::Integer(1));
        assert!(!values.contains_key("q"));
    }

    #[test]
    fn test_bad_path_segment_is_invalid_parameter() {
        let specs = vec![ParamSpec::new("item_id", ParamLocation::Path, TargetType::Integer)];
        let path = path(&[("item_id", "abc")]);
        let err = extract_params(
            &specs,
            ParamSources {
                path: &path,
                query: &Map::new(),
                payload: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("item_id"));
        assert_eq!(err.to_api_error().code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_path_segments_are_percent_decoded() {
        let specs = vec![ParamSpec::new("what", ParamLocation::Path, TargetType::String)];
        let path = path(&[("what", "hello%20world%2Fs")]);
        let values = extract_params(
            &specs,
            ParamSources {
                path: &path,
                query: &Map::new(),
                payload: None,
            },
        )
        .unwrap();
        assert_eq!(values["what"], Value::String("hello world/s".to_string()));

        let path = self::path(&[("what", "%FF%FE")]);
        let err = extract_params(
            &specs,
            ParamSources {
                path: &path,
                query: &Map::new(),
                payload: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("what"));
        assert_eq!(err.to_api_error().code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_required_query_parameter() {
        let specs = vec![ParamSpec::new("q", ParamLocation::Query, TargetType::String).required(true)];
        let err = extract_params(
            &specs,
            ParamSources {
                path: &IndexMap::new(),
                query: &Map::new(),
                payload: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing required query parameter 'q'"));
    }

    #[test]
    fn test_enum_query_parameter() {
        let specs = vec![ParamSpec::new(
            "order",
            ParamLocation::Query,
            TargetType::Enum(vec!["asc".into(), "desc".into()]),
        )];
        let query = query(json!({"order": "sideways"}));
        let err = extract_params(
            &specs,
            ParamSources {
                path: &IndexMap::new(),
                query: &query,
                payload: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not one of [asc, desc]"));
    }

    #[test]
    fn test_form_fields_and_files() {
        let specs = vec![
            ParamSpec::new("file", ParamLocation::FormData, TargetType::Bytes).required(true),
            ParamSpec::new("count", ParamLocation::FormData, TargetType::Integer),
        ];
        let mut payload = Payload::empty(BodyKind::Multipart);
        payload.fields = json!({"count": "7"});
        payload
            .files
            .insert("file".to_string(), Bytes::from_static(b"data"));
        let values = extract_params(
            &specs,
            ParamSources {
                path: &IndexMap::new(),
                query: &Map::new(),
                payload: Some(&payload),
            },
        )
        .unwrap();
        assert_eq!(values["file"], Value::Bytes(Bytes::from_static(b"data")));
        assert_eq!(values["count"], Value::Integer(7));

        let err = extract_params(
            &specs,
            ParamSources {
                path: &IndexMap::new(),
                query: &Map::new(),
                payload: Some(&Payload::empty(BodyKind::Multipart)),
            },
        )
        .unwrap_err();
        assert_eq!(err.extraction_source(), ExtractionSource::Form);
    }
}
