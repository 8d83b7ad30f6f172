//! Error types for the admission layer.
//!
//! `AuthError` classifies every way a credential can be refused. The kinds are
//! kept distinct for logs and metrics. `ApiError` is the HTTP boundary type:
//! all token rejections collapse to one generic 401 body so a client cannot
//! tell a revoked token from an expired one.

use crate::middleware::rate_limit::insert_rate_limit_headers;
use crate::revocation::RevocationError;
use crate::services::rate_limiter::RateLimitDecision;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::JwtValidationError;
use serde::Serialize;
use thiserror::Error;

/// Message returned for every 401.
pub const GENERIC_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Classified admission failure.
///
/// Display strings are for server-side logs only and never include token
/// contents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token presented")]
    NoToken,

    #[error("Token could not be parsed")]
    Malformed,

    #[error("Token signature or algorithm rejected")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Token revoked")]
    Revoked,

    #[error("Token has no jti")]
    MissingJti,

    #[error("Token kind not accepted here")]
    WrongTokenKind,

    #[error("Token audience mismatch")]
    AudienceMismatch,

    #[error("Token issuer mismatch")]
    IssuerMismatch,

    #[error("Admission dependency failed: {0}")]
    ServiceError(String),

    #[error("Token issuance failed: {0}")]
    TokenIssuance(String),
}

impl AuthError {
    /// Stable identifier for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::NoToken => "NO_TOKEN",
            AuthError::Malformed => "MALFORMED",
            AuthError::BadSignature => "BAD_SIGNATURE",
            AuthError::Expired => "EXPIRED",
            AuthError::NotYetValid => "NOT_YET_VALID",
            AuthError::Revoked => "REVOKED",
            AuthError::MissingJti => "MISSING_JTI",
            AuthError::WrongTokenKind => "WRONG_TOKEN_KIND",
            AuthError::AudienceMismatch => "AUDIENCE_MISMATCH",
            AuthError::IssuerMismatch => "ISSUER_MISMATCH",
            AuthError::ServiceError(_) => "SERVICE_ERROR",
            AuthError::TokenIssuance(_) => "TOKEN_ISSUANCE",
        }
    }

    /// True for failures caused by the server rather than the credential.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            AuthError::ServiceError(_) | AuthError::TokenIssuance(_)
        )
    }
}

impl From<RevocationError> for AuthError {
    fn from(err: RevocationError) -> Self {
        AuthError::ServiceError(err.to_string())
    }
}

impl From<JwtValidationError> for AuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid => AuthError::Malformed,
            JwtValidationError::Expired => AuthError::Expired,
            JwtValidationError::NotYetValid | JwtValidationError::IatTooFarInFuture => {
                AuthError::NotYetValid
            }
        }
    }
}

/// HTTP boundary error.
///
/// Maps to:
/// - Auth (credential problems): 401 Unauthorized
/// - Auth (`ServiceError`, `TokenIssuance`), Internal: 500
/// - RateLimited: 429 with `X-RateLimit-*` and `Retry-After`
/// - BadRequest: 400
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Auth(e) if e.is_server_side() => 500,
            ApiError::Auth(_) => 401,
            ApiError::RateLimited(_) => 429,
            ApiError::BadRequest(_) => 400,
            ApiError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Auth(AuthError::NoToken) => (
                StatusCode::UNAUTHORIZED,
                "MISSING_TOKEN",
                GENERIC_TOKEN_MESSAGE.to_string(),
            ),
            ApiError::Auth(AuthError::ServiceError(reason)) => {
                tracing::error!(target: "api.errors", reason = %reason, "Admission dependency unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SERVICE_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Auth(AuthError::TokenIssuance(reason)) => {
                tracing::error!(target: "api.errors", reason = %reason, "Token issuance failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                GENERIC_TOKEN_MESSAGE.to_string(),
            ),
            ApiError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests. Please try again later.".to_string(),
            ),
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"spot-api\", error=\"invalid_token\""),
            );
        }

        if let ApiError::RateLimited(decision) = &self {
            insert_rate_limit_headers(response.headers_mut(), decision);
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(decision.retry_after_secs()),
            );
        }

        response
    }
}
