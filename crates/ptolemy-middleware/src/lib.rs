//! # Ptolemy Middleware
//!
//! An explicit, build-time composed middleware chain:
//!
//! ```text
//! Request → pre stages → dispatcher → post stages → Response
//! ```
//!
//! - [`PreStage`]: `RequestContext -> Result<RequestContext, ApiError>`. The
//!   first error short-circuits the chain and becomes the response.
//! - [`PostStage`]: `(&RequestContext, Response) -> Response`. Runs on every
//!   response, error envelopes included.
//!
//! ## Built-in stages
//!
//! | Stage | Kind | Purpose |
//! |-------|------|---------|
//! | [`RequestIdStage`] | pre + post | Read or generate `x-request-id`, echo it back |
//! | [`BearerAuth`] | pre | Verify bearer tokens through a [`TokenVerifier`] |
//! | [`AccessLog`] | post | One structured log line per call |

#![doc(html_root_url = "https://docs.rs/ptolemy-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod stage;
pub mod stages;

pub use chain::{Chain, ChainBuilder};
pub use stage::{post_fn, pre_fn, FnPostStage, FnPreStage, PostFn, PostStage, PreStage, Response};
pub use stages::access_log::AccessLog;
pub use stages::auth::{BearerAuth, Claims, StaticTokens, TokenError, TokenVerifier};
pub use stages::request_id::{RequestIdStage, REQUEST_ID_HEADER};
