//! Authenticated request context and the extractors handlers use to read it.
//!
//! The admission middleware inserts these values into request extensions;
//! handlers never validate tokens themselves.

use crate::auth::claims::{Claims, TokenKind};
use crate::errors::ApiError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::fmt;

/// Per-request correlation identifier, present on every admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

/// Principal admitted through a self-issued token.
#[derive(Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub token_kind: TokenKind,
    pub jti: String,
    /// Expiry of the presented token (Unix seconds).
    pub expires_at: i64,
    pub correlation_id: String,
}

impl AuthContext {
    pub fn from_claims(claims: Claims, correlation_id: String) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            token_kind: claims.kind,
            jti: claims.jti,
            expires_at: claims.exp,
            correlation_id,
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("token_kind", &self.token_kind)
            .field("jti", &self.jti)
            .field("expires_at", &self.expires_at)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// Principal admitted through an external identity provider token.
#[derive(Clone)]
pub struct ProviderContext {
    pub subject: String,
    pub email: Option<String>,
    pub issuer: String,
    pub correlation_id: String,
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("subject", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("issuer", &self.issuer)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// Extractor for routes behind `require_auth`.
#[derive(Debug)]
pub struct AuthUser(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                // Route wiring error: handler mounted without the middleware
                tracing::error!(target: "api.middleware.auth", "AuthContext missing from request");
                ApiError::Internal
            })
    }
}

/// Extractor for routes behind `optional_auth`. `None` means anonymous.
#[derive(Debug)]
pub struct MaybeAuthUser(pub Option<AuthContext>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<AuthContext>().cloned()))
    }
}

/// Extractor for routes behind `require_provider_auth`.
#[derive(Debug)]
pub struct ProviderUser(pub ProviderContext);

#[async_trait]
impl<S> FromRequestParts<S> for ProviderUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ProviderContext>()
            .cloned()
            .map(ProviderUser)
            .ok_or_else(|| {
                tracing::error!(target: "api.middleware.auth", "ProviderContext missing from request");
                ApiError::Internal
            })
    }
}
