//! Session operations built on the admission layer: logout and refresh-token
//! rotation.
//!
//! Both revoke through the same bounded store calls the middleware uses, so a
//! store outage fails the operation rather than silently leaving a token
//! live.

use crate::auth::claims::{Claims, TokenKind};
use crate::errors::AuthError;
use crate::middleware::auth::AuthState;
use crate::revocation::revoke_token;
use common::jwt::unix_now;
use serde::Serialize;
use tracing::instrument;

/// Token pair returned by a refresh.
#[derive(Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer".
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Revoke the token behind `claims`. `true` if this call recorded it.
async fn revoke_claims(state: &AuthState, claims: &Claims) -> Result<bool, AuthError> {
    let inserted = revoke_token(
        state.revocation_store.as_ref(),
        &claims.jti,
        &claims.sub,
        claims.kind,
        claims.exp,
        state.revocation_timeout,
    )
    .await?;
    Ok(inserted)
}

/// Revoke the presented access token and, optionally, its paired refresh
/// token.
///
/// `token` gets every admission check except the revocation lookup: a token
/// that is already revoked logs out again successfully, so concurrent
/// logouts with the same token all succeed. A `refresh_token` that is
/// invalid, not a refresh token, or owned by another subject is ignored.
///
/// # Errors
///
/// - token verification failures for `token`
/// - `Expired` / `NotYetValid` if `token` is outside its validity window
/// - `WrongTokenKind` if `token` is not an access token
/// - `MissingJti` if `token` carries no `jti`
/// - `ServiceError` if the store fails or times out
#[instrument(skip_all, name = "api.session.logout")]
pub async fn logout(
    state: &AuthState,
    token: &str,
    refresh_token: Option<&str>,
) -> Result<(), AuthError> {
    let claims = state.issuer.validate(token)?;
    let now = unix_now();
    if claims.is_expired_at(now) {
        return Err(AuthError::Expired);
    }
    if claims.is_not_yet_valid_at(now) {
        return Err(AuthError::NotYetValid);
    }
    if claims.kind != TokenKind::Access {
        return Err(AuthError::WrongTokenKind);
    }
    if !claims.has_jti() {
        return Err(AuthError::MissingJti);
    }

    revoke_claims(state, &claims).await?;

    if let Some(refresh_token) = refresh_token {
        match state.issuer.validate(refresh_token) {
            Ok(paired)
                if paired.kind == TokenKind::Refresh
                    && paired.sub == claims.sub
                    && paired.has_jti() =>
            {
                revoke_claims(state, &paired).await?;
            }
            Ok(_) => {
                tracing::debug!(
                    target: "api.session",
                    "Ignoring refresh token that does not pair with the session"
                );
            }
            Err(e) => {
                tracing::debug!(
                    target: "api.session",
                    kind = e.kind(),
                    "Ignoring invalid refresh token on logout"
                );
            }
        }
    }

    tracing::info!(target: "api.session", "Session logged out");
    Ok(())
}

/// Exchange a refresh token for a new access/refresh pair.
///
/// The presented refresh token goes through the full admission checks with
/// kind `refresh`, is revoked, and only then are new tokens issued. If the
/// revocation cannot be recorded no tokens are issued. The revoke is the
/// gate: of two concurrent refreshes with one token, only the call whose
/// revoke inserted the entry gets a new pair.
///
/// # Errors
///
/// - any admission failure for `refresh_token` (`WrongTokenKind` for an
///   access token)
/// - `Revoked` if another refresh spent the token first
/// - `ServiceError` if the store fails or times out
/// - `TokenIssuance` if signing fails
#[instrument(skip_all, name = "api.session.refresh")]
pub async fn refresh(state: &AuthState, refresh_token: &str) -> Result<TokenPair, AuthError> {
    let claims = state.admit(refresh_token, TokenKind::Refresh).await?;

    if !revoke_claims(state, &claims).await? {
        tracing::warn!(target: "api.session", "Refresh token spent concurrently");
        return Err(AuthError::Revoked);
    }

    let access_token = state.issuer.issue_access_token(&claims.sub, &claims.email)?;
    let refresh_token = state.issuer.issue_refresh_token(&claims.sub, &claims.email)?;

    tracing::info!(target: "api.session", "Refresh token rotated");

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.issuer.access_ttl().as_secs(),
    })
}
