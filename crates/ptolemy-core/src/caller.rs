//! Caller information attached to each request.

use std::net::SocketAddr;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Who is calling, as far as the server can tell.
///
/// `user_id` is filled in by the authentication stage once a token has
/// been verified. The network fields come from the connection and the
/// usual proxy headers.
///
/// # Example
///
/// ```rust
/// use ptolemy_core::Caller;
///
/// let caller = Caller::anonymous().with_user_id("u-123");
/// assert!(caller.is_authenticated());
/// assert_eq!(caller.log_id(), "user:u-123");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Verified user id, if any.
    pub user_id: Option<String>,
    /// Peer address of the connection.
    pub ip: Option<String>,
    /// First hop from `X-Forwarded-For`.
    pub forwarded_ip: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
}

impl Caller {
    /// An unauthenticated caller with no network information.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds a caller from request headers and the peer address.
    #[must_use]
    pub fn from_parts(headers: &HeaderMap, remote: Option<SocketAddr>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        let forwarded_ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .filter(|v| !v.is_empty());

        Self {
            user_id: None,
            ip: remote.map(|addr| addr.ip().to_string()),
            forwarded_ip,
            user_agent: header("user-agent"),
        }
    }

    /// Returns a copy carrying the given user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns `true` once a token has been verified for this caller.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Identifier suitable for logging. Never includes credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        match &self.user_id {
            Some(id) => format!("user:{id}"),
            None => "anonymous".to_string(),
        }
    }

    /// Best guess at the client address: the forwarded one, else the peer.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.forwarded_ip.as_deref().or(self.ip.as_deref())
    }
}
