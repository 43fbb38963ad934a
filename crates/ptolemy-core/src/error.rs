//! Error taxonomy for Ptolemy.
//!
//! Every failure that reaches a client is an [`ApiError`]. An `ApiError`
//! belongs to exactly one [`ErrorKind`], which fixes both the HTTP status and
//! the symbolic code written in the JSON envelope.
//!
//! | `ErrorKind` | Code | Status |
//! |---|---|---|
//! | `InvalidParameter` | `INVALID_PARAMETER` | 400 |
//! | `AuthorizationHeaderMissing` | `AUTHORIZATION_HEADER_MISSING` | 401 |
//! | `TokenInvalid` | `TOKEN_INVALID` | 401 |
//! | `TokenExpired` | `TOKEN_EXPIRED` | 401 |
//! | `RequestTimeout` | `REQUEST_TIMEOUT` | 408 |
//! | `BadResponse` | `BAD_RESPONSE` | 500 |
//! | `InternalValidation` | `INTERNAL_VALIDATION_ERROR` | 500 |
//! | `UnhandledServer` | `UNHANDLED_SERVER_ERROR` | 500 |
//! | `Custom` | user defined | user defined |

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::ModelError;

/// Result type alias using [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;

/// The class of an [`ApiError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A request-supplied value failed schema validation.
    InvalidParameter,
    /// No `Authorization` header on a protected route.
    AuthorizationHeaderMissing,
    /// The bearer token was rejected.
    TokenInvalid,
    /// The bearer token has expired.
    TokenExpired,
    /// Handler invocation or body read exceeded its deadline.
    RequestTimeout,
    /// The handler returned something other than a declared result.
    BadResponse,
    /// A model built inside handler code failed validation.
    InternalValidation,
    /// Anything not already classified.
    UnhandledServer,
    /// An application-defined error.
    Custom {
        /// Upper snake case code.
        code: Cow<'static, str>,
        /// HTTP status.
        status: StatusCode,
    },
}

impl ErrorKind {
    /// Declares an application-defined error kind.
    ///
    /// ```
    /// use http::StatusCode;
    /// use ptolemy_core::ErrorKind;
    ///
    /// let kind = ErrorKind::custom("ORDER_NOT_FOUND", StatusCode::NOT_FOUND);
    /// assert_eq!(kind.code(), "ORDER_NOT_FOUND");
    /// ```
    #[must_use]
    pub fn custom(code: impl Into<Cow<'static, str>>, status: StatusCode) -> Self {
        Self::Custom {
            code: code.into(),
            status,
        }
    }

    /// Route not found.
    #[must_use]
    pub const fn not_found() -> Self {
        Self::Custom {
            code: Cow::Borrowed("NOT_FOUND"),
            status: StatusCode::NOT_FOUND,
        }
    }

    /// Route exists but not for this method.
    #[must_use]
    pub const fn method_not_allowed() -> Self {
        Self::Custom {
            code: Cow::Borrowed("METHOD_NOT_ALLOWED"),
            status: StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Returns the HTTP status code for this kind.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidParameter => StatusCode::BAD_REQUEST,
            Self::AuthorizationHeaderMissing | Self::TokenInvalid | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::BadResponse | Self::InternalValidation | Self::UnhandledServer => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Custom { status, .. } => *status,
        }
    }

    /// Returns the machine-readable code written to the envelope.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::AuthorizationHeaderMissing => "AUTHORIZATION_HEADER_MISSING",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::BadResponse => "BAD_RESPONSE",
            Self::InternalValidation => "INTERNAL_VALIDATION_ERROR",
            Self::UnhandledServer => "UNHANDLED_SERVER_ERROR",
            Self::Custom { code, .. } => code.as_ref(),
        }
    }

    /// Maps a code received from an upstream envelope back to a kind.
    ///
    /// Unknown codes become [`ErrorKind::Custom`] carrying the given status.
    #[must_use]
    pub fn from_code(code: &str, status: StatusCode) -> Self {
        match code {
            "INVALID_PARAMETER" => Self::InvalidParameter,
            "AUTHORIZATION_HEADER_MISSING" => Self::AuthorizationHeaderMissing,
            "TOKEN_INVALID" => Self::TokenInvalid,
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "REQUEST_TIMEOUT" => Self::RequestTimeout,
            "BAD_RESPONSE" => Self::BadResponse,
            "INTERNAL_VALIDATION_ERROR" => Self::InternalValidation,
            "UNHANDLED_SERVER_ERROR" => Self::UnhandledServer,
            other => Self::custom(other.to_string(), status),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified error.
///
/// # Example
///
/// ```
/// use ptolemy_core::ApiError;
///
/// fn parse_limit(raw: &str) -> Result<u32, ApiError> {
///     raw.parse()
///         .map_err(|_| ApiError::invalid_parameter(format!("limit '{raw}' is not a number")))
/// }
///
/// let err = parse_limit("ten").unwrap_err();
/// assert_eq!(err.status_code().as_u16(), 400);
/// assert_eq!(err.code(), "INVALID_PARAMETER");
/// ```
#[derive(Error, Debug, Clone)]
#[error("{kind}: {description}")]
pub struct ApiError {
    kind: ErrorKind,
    description: String,
    error_id: Option<Uuid>,
    user_message: Option<String>,
    caught: Option<String>,
    trace: Option<String>,
    reportable: bool,
}

impl ApiError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            error_id: None,
            user_message: None,
            caught: None,
            trace: None,
            reportable: false,
        }
    }

    /// Creates an `INVALID_PARAMETER` error.
    #[must_use]
    pub fn invalid_parameter(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, description)
    }

    /// Creates an `AUTHORIZATION_HEADER_MISSING` error.
    #[must_use]
    pub fn authorization_header_missing(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationHeaderMissing, description)
    }

    /// Creates a `TOKEN_INVALID` error.
    #[must_use]
    pub fn token_invalid(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenInvalid, description)
    }

    /// Creates a `TOKEN_EXPIRED` error.
    #[must_use]
    pub fn token_expired(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, description)
    }

    /// Creates a `REQUEST_TIMEOUT` error.
    #[must_use]
    pub fn request_timeout(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestTimeout, description)
    }

    /// Creates a `BAD_RESPONSE` error.
    #[must_use]
    pub fn bad_response(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadResponse, description)
    }

    /// Creates an `INTERNAL_VALIDATION_ERROR` error.
    #[must_use]
    pub fn internal_validation(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalValidation, description)
    }

    /// Creates an `UNHANDLED_SERVER_ERROR` error.
    #[must_use]
    pub fn unhandled(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnhandledServer, description)
    }

    /// Attaches a message meant for end users.
    #[must_use]
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    /// Attaches an existing error identifier.
    #[must_use]
    pub fn with_error_id(mut self, error_id: Uuid) -> Self {
        self.error_id = Some(error_id);
        self
    }

    /// Records the underlying error that was caught. Never sent to clients.
    #[must_use]
    pub fn with_caught(mut self, caught: impl fmt::Display) -> Self {
        self.caught = Some(caught.to_string());
        self
    }

    /// Marks a non-fatal error as worth reporting to the crash reporter.
    #[must_use]
    pub fn reportable(mut self) -> Self {
        self.reportable = true;
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the envelope code.
    #[must_use]
    pub fn code(&self) -> &str {
        self.kind.code()
    }

    /// Returns the HTTP status.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the error identifier, if one was assigned.
    #[must_use]
    pub const fn error_id(&self) -> Option<Uuid> {
        self.error_id
    }

    /// Records the stack trace taken where the failure happened.
    #[must_use]
    pub fn with_trace(mut self, trace: impl fmt::Display) -> Self {
        self.trace = Some(trace.to_string());
        self
    }

    /// Returns the user message, if any.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref()
    }

    /// Returns the caught error, if any.
    #[must_use]
    pub fn caught(&self) -> Option<&str> {
        self.caught.as_deref()
    }

    /// Returns the stack trace of the failure, if one was captured.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Returns `true` for server-side (5xx) errors.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Returns `true` if this error should reach the crash reporter.
    #[must_use]
    pub fn should_report(&self) -> bool {
        self.is_fatal() || self.reportable
    }

    /// Assigns an error identifier unless one is already present.
    ///
    /// Identifiers are generated on the first hop only; an error rebuilt from
    /// an upstream envelope keeps the upstream identifier.
    pub fn ensure_error_id(&mut self) -> Uuid {
        *self.error_id.get_or_insert_with(Uuid::now_v7)
    }

    /// Converts this error into its wire envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            status: self.status_code().as_u16(),
            error: self.code().to_string(),
            error_description: self.description.clone(),
            error_id: self.error_id.map(|id| id.to_string()),
            user_message: self.user_message.clone(),
        }
    }

    /// Rebuilds an error from an envelope received from another service.
    #[must_use]
    pub fn from_envelope(envelope: &ErrorEnvelope) -> Self {
        let status = StatusCode::from_u16(envelope.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            kind: ErrorKind::from_code(&envelope.error, status),
            description: envelope.error_description.clone(),
            error_id: envelope
                .error_id
                .as_deref()
                .and_then(|id| Uuid::parse_str(id).ok()),
            user_message: envelope.user_message.clone(),
            caught: None,
            trace: None,
            reportable: false,
        }
    }
}

impl From<ModelError> for ApiError {
    /// Model errors raised while the handler runs are server bugs.
    fn from(err: ModelError) -> Self {
        Self::internal_validation(err.to_string()).with_caught(&err)
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// HTTP status, equal to the response status.
    pub status: u16,
    /// Upper snake case code.
    pub error: String,
    /// Human-readable description.
    pub error_description: String,
    /// Identifier assigned on the first hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    /// Message meant for end users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_status_codes() {
        let cases = [
            (ApiError::invalid_parameter("x"), 400, "INVALID_PARAMETER"),
            (
                ApiError::authorization_header_missing("x"),
                401,
                "AUTHORIZATION_HEADER_MISSING",
            ),
            (ApiError::token_invalid("x"), 401, "TOKEN_INVALID"),
            (ApiError::token_expired("x"), 401, "TOKEN_EXPIRED"),
            (ApiError::request_timeout("x"), 408, "REQUEST_TIMEOUT"),
            (ApiError::bad_response("x"), 500, "BAD_RESPONSE"),
            (
                ApiError::internal_validation("x"),
                500,
                "INTERNAL_VALIDATION_ERROR",
            ),
            (ApiError::unhandled("x"), 500, "UNHANDLED_SERVER_ERROR"),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status_code().as_u16(), status, "{code}");
            assert_eq!(error.code(), code);
            assert_eq!(error.to_envelope().status, status);
        }
    }

    #[test]
    fn test_custom_kind() {
        let kind = ErrorKind::custom("FATAL_CUSTOM_ERROR", StatusCode::from_u16(543).unwrap());
        let error = ApiError::new(kind, "boom");
        assert_eq!(error.status_code().as_u16(), 543);
        assert!(error.is_fatal());
        assert_eq!(error.to_string(), "FATAL_CUSTOM_ERROR: boom");
    }

    #[test]
    fn test_should_report() {
        assert!(ApiError::unhandled("x").should_report());
        assert!(!ApiError::invalid_parameter("x").should_report());
        assert!(!ApiError::request_timeout("x").should_report());
        assert!(ApiError::invalid_parameter("x").reportable().should_report());
    }

    #[test]
    fn test_envelope_omits_unset_fields() {
        let json = serde_json::to_value(ApiError::bad_response("nope").to_envelope()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": 500,
                "error": "BAD_RESPONSE",
                "error_description": "nope",
            })
        );
    }

    #[test]
    fn test_error_id_first_hop_only() {
        let mut error = ApiError::unhandled("boom");
        let first = error.ensure_error_id();
        let second = error.ensure_error_id();
        assert_eq!(first, second);

        let envelope = error.to_envelope();
        let mut forwarded = ApiError::from_envelope(&envelope);
        assert_eq!(forwarded.ensure_error_id(), first);
        assert_eq!(forwarded.code(), "UNHANDLED_SERVER_ERROR");
    }

    #[test]
    fn test_from_envelope_unknown_code() {
        let envelope = ErrorEnvelope {
            status: 404,
            error: "ORDER_NOT_FOUND".to_string(),
            error_description: "no such order".to_string(),
            error_id: None,
            user_message: Some("Sorry".to_string()),
        };
        let error = ApiError::from_envelope(&envelope);
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.code(), "ORDER_NOT_FOUND");
        assert_eq!(error.user_message(), Some("Sorry"));
    }

    #[test]
    fn test_caught_is_not_in_envelope() {
        let error = ApiError::unhandled("boom").with_caught("division by zero");
        assert_eq!(error.caught(), Some("division by zero"));
        let json = serde_json::to_string(&error.to_envelope()).unwrap();
        assert!(!json.contains("division"));
    }
}
