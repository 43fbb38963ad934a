//! `application/x-www-form-urlencoded` bodies and query strings.

use serde_json::{Map, Value as Json};

use crate::error::{ExtractionError, ExtractionResult, ExtractionSource};

/// Parses url-encoded pairs into a string map.
///
/// When a key repeats, the first value wins.
pub fn parse_urlencoded(raw: &[u8], source: ExtractionSource) -> ExtractionResult<Map<String, Json>> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(raw).map_err(|e| ExtractionError::malformed(source, e))?;
    let mut fields = Map::with_capacity(pairs.len());
    for (key, value) in pairs {
        fields.entry(key).or_insert(Json::String(value));
    }
    Ok(fields)
}

/// Parses a query string. A missing query is an empty map.
pub fn parse_query(query: Option<&str>) -> ExtractionResult<Map<String, Json>> {
    match query {
        Some(q) if !q.is_empty() => parse_urlencoded(q.as_bytes(), ExtractionSource::Query),
        _ => Ok(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_body() {
        let fields = parse_urlencoded(b"name=Hello+World&tag=a%26b", ExtractionSource::Body).unwrap();
        assert_eq!(fields["name"], "Hello World");
        assert_eq!(fields["tag"], "a&b");
    }

    #[test]
    fn test_first_value_wins() {
        let fields = parse_query(Some("page=1&page=2")).unwrap();
        assert_eq!(fields["page"], "1");
    }

    #[test]
    fn test_empty_query() {
        assert!(parse_query(None).unwrap().is_empty());
        assert!(parse_query(Some("")).unwrap().is_empty());
    }
}
