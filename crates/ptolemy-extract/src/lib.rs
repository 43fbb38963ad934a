//! # Ptolemy Extract
//!
//! Turns raw request parts into handler input:
//!
//! | Input | Function | Output |
//! |-------|----------|--------|
//! | Body + `Content-Type` | [`read_payload`] | [`Payload`]: JSON, form fields, files |
//! | Query string | [`parse_query`] | string map |
//! | Route segments, query, form | [`extract_params`] | typed [`Value`](ptolemy_core::Value)s |
//!
//! Every failure is an [`ExtractionError`], which converts into
//! `INVALID_PARAMETER` (or `REQUEST_TIMEOUT` for an unreadable body).

#![doc(html_root_url = "https://docs.rs/ptolemy-extract/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod body;
mod error;
mod form;
pub mod multipart;
mod params;

pub use body::{read_payload, BodyKind, Payload};
pub use error::{ExtractionError, ExtractionResult, ExtractionSource};
pub use form::{parse_query, parse_urlencoded};
pub use multipart::{read_multipart, MultipartConfig, MultipartForm};
pub use params::{extract_params, ParamSources};
