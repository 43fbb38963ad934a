//! Bearer token authentication.
//!
//! Token verification itself is pluggable through [`TokenVerifier`]; this
//! stage only reads the `Authorization` header, maps verifier failures onto
//! the error taxonomy and records the verified user on the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ptolemy_core::{ApiError, RequestContext};
use thiserror::Error;
use tracing::debug;

use crate::stage::PreStage;

/// Why a token was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token is malformed, forged or unknown.
    #[error("{0}")]
    Invalid(String),
    /// The token was valid but has expired.
    #[error("token has expired")]
    Expired,
}

/// What a verified token says about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User id.
    pub subject: String,
}

/// Verifies bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verifies `token`, returning the caller's claims.
    async fn verify(&self, token: &str) -> Result<Claims, TokenError>;
}

/// A fixed token → user table. Useful for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Result<String, TokenError>>,
}

impl StaticTokens {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` for `user`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), Ok(user.into()));
        self
    }

    /// Reports `token` as expired.
    #[must_use]
    pub fn with_expired(mut self, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), Err(TokenError::Expired));
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        match self.tokens.get(token) {
            Some(Ok(user)) => Ok(Claims {
                subject: user.clone(),
            }),
            Some(Err(err)) => Err(err.clone()),
            None => Err(TokenError::Invalid("unknown token".to_string())),
        }
    }
}

/// Requires a verified bearer token on every path not exempted.
#[derive(Clone)]
pub struct BearerAuth {
    verifier: Arc<dyn TokenVerifier>,
    exempt: Vec<String>,
}

impl BearerAuth {
    /// Creates the stage.
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            exempt: Vec::new(),
        }
    }

    /// Lets requests under `prefix` through without a token.
    #[must_use]
    pub fn exempt(mut self, prefix: impl Into<String>) -> Self {
        self.exempt.push(prefix.into());
        self
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.exempt.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("exempt", &self.exempt)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PreStage for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer_auth"
    }

    async fn before(&self, mut ctx: RequestContext) -> Result<RequestContext, ApiError> {
        if self.is_exempt(ctx.path()) {
            return Ok(ctx);
        }

        let header = ctx
            .header(http::header::AUTHORIZATION.as_str())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::authorization_header_missing("Authorization header missing"))?;

        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
            _ => {
                return Err(ApiError::token_invalid(
                    "Authorization header must be 'Bearer <token>'",
                ))
            }
        };

        let claims = self.verifier.verify(token).await.map_err(|err| match err {
            TokenError::Expired => ApiError::token_expired("token has expired"),
            TokenError::Invalid(reason) => ApiError::token_invalid(reason),
        })?;

        debug!(request_id = %ctx.request_id(), user = %claims.subject, "caller authenticated");
        ctx.caller_mut().user_id = Some(claims.subject);
        Ok(ctx)
    }
}
