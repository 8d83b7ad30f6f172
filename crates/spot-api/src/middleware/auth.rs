//! Admission middleware for protected routes.
//!
//! Per request, short-circuiting on the first failure:
//! 1. Take the token from `Authorization: Bearer <token>`, else from the
//!    session cookie. Neither present: `NO_TOKEN`
//! 2. Verify it with the [`TokenIssuer`]
//! 3. Reject if `now >= exp` or `now < nbf`
//! 4. Reject if the token kind is not the one this route accepts
//! 5. Reject if it has no `jti`
//! 6. Ask the revocation store, bounded by a timeout. Revoked: `REVOKED`.
//!    Store error or timeout: `SERVICE_ERROR`, the request is rejected
//! 7. Attach an [`AuthContext`] and continue
//!
//! Rejection kinds are logged and counted individually; the client sees one
//! generic 401.

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::context::{AuthContext, CorrelationId, ProviderContext};
use crate::auth::issuer::TokenIssuer;
use crate::auth::oidc::OidcValidator;
use crate::errors::{ApiError, AuthError};
use crate::observability::metrics;
use crate::revocation::{check_revoked, RevocationStore};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use common::jwt::unix_now;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const X_REQUEST_ID: &str = "x-request-id";
const MAX_CORRELATION_ID_LEN: usize = 128;

/// State shared by the admission middleware variants.
#[derive(Clone)]
pub struct AuthState {
    pub issuer: Arc<TokenIssuer>,
    pub revocation_store: Arc<dyn RevocationStore>,
    /// Bound on every revocation store call.
    pub revocation_timeout: Duration,
    /// Cookie consulted when there is no bearer token.
    pub cookie_name: Arc<str>,
    /// Present only when an external identity provider is configured.
    pub oidc: Option<Arc<OidcValidator>>,
}

impl AuthState {
    /// Run the self-issued admission checks (steps 2-6) on `token`.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a classified [`AuthError`].
    pub async fn admit(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.issuer.validate(token)?;

        let now = unix_now();
        if claims.is_expired_at(now) {
            return Err(AuthError::Expired);
        }

        if claims.is_not_yet_valid_at(now) {
            return Err(AuthError::NotYetValid);
        }

        if claims.kind != expected {
            return Err(AuthError::WrongTokenKind);
        }

        // Every issuance path sets a jti; one without it cannot be revoked
        if !claims.has_jti() {
            return Err(AuthError::MissingJti);
        }

        if check_revoked(self.revocation_store.as_ref(), &claims.jti, self.revocation_timeout)
            .await?
        {
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }
}

/// Bearer token from `Authorization`, else the named cookie.
///
/// A non-Bearer `Authorization` header (e.g. `Basic`) does not block the
/// cookie fallback.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Token from `Authorization: Bearer <token>`, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// `X-Request-Id` when it is 1..=128 visible ASCII characters, else a fresh
/// UUID v4.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_CORRELATION_ID_LEN
                && id.bytes().all(|b| b.is_ascii_graphic())
        })
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

fn reject(err: AuthError, correlation_id: &str) -> ApiError {
    record_rejection(&err, correlation_id);
    ApiError::Auth(err)
}

pub(crate) fn record_rejection(err: &AuthError, correlation_id: &str) {
    metrics::record_admission_rejection(err.kind());
    if err.is_server_side() {
        tracing::warn!(
            target: "api.middleware.auth",
            reason = err.kind(),
            correlation_id = %correlation_id,
            "Admission failed closed"
        );
    } else {
        tracing::debug!(
            target: "api.middleware.auth",
            reason = err.kind(),
            correlation_id = %correlation_id,
            "Request rejected"
        );
    }
}

/// Require a valid, unrevoked access token.
#[instrument(skip_all, name = "api.middleware.auth.require")]
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(req.headers());

    let token = extract_token(req.headers(), &state.cookie_name)
        .ok_or_else(|| reject(AuthError::NoToken, &correlation_id))?;

    let claims = state
        .admit(&token, TokenKind::Access)
        .await
        .map_err(|e| reject(e, &correlation_id))?;

    metrics::record_admission_success("self");
    req.extensions_mut()
        .insert(AuthContext::from_claims(claims, correlation_id.clone()));
    req.extensions_mut().insert(CorrelationId(correlation_id));

    Ok(next.run(req).await)
}

/// Admit anonymous requests, attaching an [`AuthContext`] when a valid
/// access token is presented.
///
/// A presented token that fails any check is counted and the request
/// proceeds anonymously; no context is attached for it.
#[instrument(skip_all, name = "api.middleware.auth.optional")]
pub async fn optional_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let correlation_id = correlation_id(req.headers());

    let context = match extract_token(req.headers(), &state.cookie_name) {
        None => None,
        Some(token) => match state.admit(&token, TokenKind::Access).await {
            Ok(claims) => Some(AuthContext::from_claims(claims, correlation_id.clone())),
            Err(e) => {
                record_rejection(&e, &correlation_id);
                None
            }
        },
    };

    match context {
        Some(context) => {
            metrics::record_admission_success("self");
            req.extensions_mut().insert(context);
        }
        None => metrics::record_admission_success("anonymous"),
    }
    req.extensions_mut().insert(CorrelationId(correlation_id));

    next.run(req).await
}

/// Require a valid token from the external identity provider.
#[instrument(skip_all, name = "api.middleware.auth.provider")]
pub async fn require_provider_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(req.headers());

    let Some(oidc) = state.oidc.as_ref() else {
        tracing::error!(target: "api.middleware.auth", "Provider route mounted without OIDC configuration");
        return Err(ApiError::Internal);
    };

    let token =
        bearer_token(req.headers()).ok_or_else(|| reject(AuthError::NoToken, &correlation_id))?;

    let claims = oidc
        .validate(&token)
        .await
        .map_err(|e| reject(e, &correlation_id))?;

    metrics::record_admission_success("provider");
    req.extensions_mut().insert(ProviderContext {
        subject: claims.sub,
        email: claims.email,
        issuer: oidc.issuer().to_string(),
        correlation_id: correlation_id.clone(),
    });
    req.extensions_mut().insert(CorrelationId(correlation_id));

    Ok(next.run(req).await)
}
