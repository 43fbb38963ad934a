//! # Ptolemy Test
//!
//! In-memory testing for Ptolemy services. Requests go straight into a
//! [`Dispatcher`](ptolemy_server::Dispatcher), through the middleware
//! chain and the handler, with no socket involved.
//!
//! | Type | Role |
//! |------|------|
//! | [`TestClient`] | owns the dispatcher, hands out request builders |
//! | [`TestRequest`] | method, URI, headers, body and peer address |
//! | [`TestResponse`] | status, headers, JSON and error envelope assertions |
//!
//! ## Example
//!
//! ```ignore
//! let client = TestClient::new(dispatcher);
//!
//! client
//!     .get("/item/42")
//!     .send()
//!     .await
//!     .assert_status(200)
//!     .assert_json(&json!({"id": 42, "name": "x"}));
//!
//! client
//!     .get("/item/abc")
//!     .send()
//!     .await
//!     .assert_error(400, "INVALID_PARAMETER");
//! ```

#![doc(html_root_url = "https://docs.rs/ptolemy-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
