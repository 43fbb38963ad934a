//! Extraction error types.

use std::fmt;

use http::StatusCode;
use ptolemy_core::ApiError;
use thiserror::Error;

/// Where data was being extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// A `{name}` route segment.
    Path,
    /// The query string.
    Query,
    /// The request body.
    Body,
    /// A url-encoded or multipart form field.
    Form,
    /// The `Content-Type` header.
    ContentType,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
            Self::Form => "form",
            Self::ContentType => "content-type",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractionErrorKind {
    Missing,
    InvalidType,
    Malformed,
    PayloadTooLarge,
    Disconnected,
}

/// A request that could not be turned into handler input.
///
/// Every extraction error is the caller's fault and maps to
/// `INVALID_PARAMETER`, except a body that could not be read in time,
/// which maps to `REQUEST_TIMEOUT`.
///
/// ```rust
/// use ptolemy_extract::{ExtractionError, ExtractionSource};
///
/// let err = ExtractionError::missing(ExtractionSource::Query, "limit");
/// assert_eq!(err.field(), Some("limit"));
/// assert_eq!(err.to_api_error().code(), "INVALID_PARAMETER");
/// ```
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ExtractionError {
    extraction_source: ExtractionSource,
    kind: ExtractionErrorKind,
    field: Option<String>,
    message: String,
}

impl ExtractionError {
    /// A required parameter is absent.
    #[must_use]
    pub fn missing(source: ExtractionSource, field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            extraction_source: source,
            kind: ExtractionErrorKind::Missing,
            message: format!("missing required {source} parameter '{field}'"),
            field: Some(field),
        }
    }

    /// A parameter could not be coerced to its declared type.
    #[must_use]
    pub fn invalid_type(
        source: ExtractionSource,
        field: impl Into<String>,
        details: impl fmt::Display,
    ) -> Self {
        let field = field.into();
        Self {
            extraction_source: source,
            kind: ExtractionErrorKind::InvalidType,
            message: format!("invalid {source} parameter '{field}': {details}"),
            field: Some(field),
        }
    }

    /// The body or query string could not be parsed at all.
    #[must_use]
    pub fn malformed(source: ExtractionSource, details: impl fmt::Display) -> Self {
        Self {
            extraction_source: source,
            kind: ExtractionErrorKind::Malformed,
            message: format!("malformed {source}: {details}"),
            field: None,
        }
    }

    /// The body exceeds the configured limit.
    #[must_use]
    pub fn payload_too_large(max_size: usize, actual_size: usize) -> Self {
        Self {
            extraction_source: ExtractionSource::Body,
            kind: ExtractionErrorKind::PayloadTooLarge,
            message: format!("payload too large: max {max_size} bytes, got {actual_size} bytes"),
            field: None,
        }
    }

    /// The client went away or was too slow while sending the body.
    #[must_use]
    pub fn disconnected(details: impl fmt::Display) -> Self {
        Self {
            extraction_source: ExtractionSource::Body,
            kind: ExtractionErrorKind::Disconnected,
            message: format!("failed to read request body: {details}"),
            field: None,
        }
    }

    /// Where the failure happened.
    #[must_use]
    pub const fn extraction_source(&self) -> ExtractionSource {
        self.extraction_source
    }

    /// The offending parameter, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Returns `true` for a body that could not be read in time.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        self.kind == ExtractionErrorKind::Disconnected
    }

    /// HTTP status of the equivalent API error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_disconnect() {
            StatusCode::REQUEST_TIMEOUT
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Converts into the API taxonomy.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        if self.is_disconnect() {
            ApiError::request_timeout(self.message.as_str())
        } else {
            ApiError::invalid_parameter(self.message.as_str())
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        err.to_api_error()
    }
}

/// Result type for extraction.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_type_message() {
        let err = ExtractionError::invalid_type(
            ExtractionSource::Path,
            "item_id",
            "expected integer, got 'abc'",
        );
        assert_eq!(err.extraction_source(), ExtractionSource::Path);
        assert_eq!(
            err.to_string(),
            "invalid path parameter 'item_id': expected integer, got 'abc'"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_disconnect_is_a_timeout() {
        let err = ExtractionError::disconnected("connection reset");
        assert!(err.is_disconnect());
        let api: ApiError = err.into();
        assert_eq!(api.code(), "REQUEST_TIMEOUT");
        assert_eq!(api.status_code(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_payload_too_large_is_invalid_parameter() {
        let api = ExtractionError::payload_too_large(10, 20).to_api_error();
        assert_eq!(api.code(), "INVALID_PARAMETER");
        assert!(api.description().contains("max 10 bytes"));
    }

    #[test]
    fn test_source_display() {
        assert_eq!(ExtractionSource::Form.to_string(), "form");
        assert_eq!(ExtractionSource::ContentType.to_string(), "content-type");
    }
}
