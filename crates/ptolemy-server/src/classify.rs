//! Error classifier.
//!
//! Maps whatever a handler failed with onto the closed taxonomy.

use std::any::Any;
use std::backtrace::BacktraceStatus;

use ptolemy_core::{ApiError, HandlerError};

/// Classifies a handler error.
///
/// | Handler error | Result |
/// |---------------|--------|
/// | [`HandlerError::Api`] | unchanged |
/// | [`HandlerError::Model`] | `INTERNAL_VALIDATION_ERROR` |
/// | [`HandlerError::Other`] | `UNHANDLED_SERVER_ERROR` |
#[must_use]
pub fn classify(err: HandlerError) -> ApiError {
    match err {
        HandlerError::Api(err) => err,
        HandlerError::Model(err) => ApiError::from(err),
        HandlerError::Other(err) => {
            let classified =
                ApiError::unhandled(err.to_string()).with_caught(format_args!("{err:#}"));
            let trace = err.backtrace();
            if trace.status() == BacktraceStatus::Captured {
                classified.with_trace(trace)
            } else {
                classified
            }
        }
    }
}

/// Classifies a panic caught at the handler boundary.
#[must_use]
pub fn classify_panic(payload: Box<dyn Any + Send>) -> ApiError {
    let message = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    ApiError::unhandled(message.clone()).with_caught(format_args!("panic: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use ptolemy_core::ModelError;

    #[test]
    fn test_api_errors_pass_through() {
        let original = ApiError::invalid_parameter("bad id").with_user_message("Try again");
        let classified = classify(HandlerError::Api(original));
        assert_eq!(classified.code(), "INVALID_PARAMETER");
        assert_eq!(classified.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(classified.user_message(), Some("Try again"));
    }

    #[test]
    fn test_model_errors_are_internal() {
        let classified = classify(HandlerError::Model(ModelError::UnknownModel("Ghost".into())));
        assert_eq!(classified.code(), "INTERNAL_VALIDATION_ERROR");
        assert_eq!(classified.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_other_errors_are_unhandled() {
        let classified = classify(HandlerError::Other(anyhow::anyhow!("disk on fire")));
        assert_eq!(classified.code(), "UNHANDLED_SERVER_ERROR");
        assert_eq!(classified.description(), "disk on fire");
        assert!(classified.caught().is_some());
    }

    #[test]
    fn test_caught_keeps_the_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("loading item 42");
        let classified = classify(HandlerError::Other(err));
        assert_eq!(classified.description(), "loading item 42");
        assert_eq!(classified.caught(), Some("loading item 42: connection refused"));
    }

    #[test]
    fn test_panic_payloads() {
        let from_str = classify_panic(Box::new("boom"));
        assert_eq!(from_str.description(), "boom");

        let from_string = classify_panic(Box::new(String::from("kaboom")));
        assert_eq!(from_string.description(), "kaboom");

        let opaque = classify_panic(Box::new(42_u8));
        assert_eq!(opaque.description(), "handler panicked");
        assert_eq!(opaque.code(), "UNHANDLED_SERVER_ERROR");
    }
}
