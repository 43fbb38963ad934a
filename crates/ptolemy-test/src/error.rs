//! Test error types.

use thiserror::Error;

/// Errors raised while building a request or reading a response.
#[derive(Error, Debug)]
pub enum TestError {
    /// The URI, a header or the body could not be built.
    #[error("request build error: {0}")]
    RequestBuild(String),

    /// The body is not what the caller asked for.
    #[error("body read error: {0}")]
    BodyRead(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Form encoding failed.
    #[error("form encoding error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
}
