//! Validation of tokens issued by an external OIDC identity provider.
//!
//! The library verifies the signature only. Issuer, audience, expiry and
//! not-before are then checked here one at a time, each with its own error,
//! so a misconfigured issuer is never reported as an expired token.

use crate::auth::jwks::JwksClient;
use crate::errors::AuthError;
use common::jwt::{peek_kid_and_alg, unix_now, validate_time_window_at};
use jsonwebtoken::{decode, errors::ErrorKind, Validation};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// `aud` as either a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims read from a provider token.
#[derive(Clone, Deserialize)]
pub struct ProviderClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: i64,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl fmt::Debug for ProviderClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClaims")
            .field("sub", &"[REDACTED]")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .finish()
    }
}

/// Validator for provider-issued tokens.
pub struct OidcValidator {
    jwks_client: Arc<JwksClient>,
    issuer: String,
    audience: String,
    leeway: Duration,
}

impl OidcValidator {
    pub fn new(
        jwks_client: Arc<JwksClient>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        leeway: Duration,
    ) -> Self {
        Self {
            jwks_client,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Validate a provider token at the current time.
    ///
    /// # Errors
    ///
    /// See [`OidcValidator::validate_at`].
    pub async fn validate(&self, token: &str) -> Result<ProviderClaims, AuthError> {
        self.validate_at(token, unix_now()).await
    }

    /// Validate a provider token as of `now`.
    ///
    /// # Security Checks
    ///
    /// 1. Size and header checks, `kid` required
    /// 2. Key lookup via JWKS; header `alg` must match the key's algorithm
    /// 3. Signature verification
    /// 4. `iss` equals the configured issuer
    /// 5. `aud` contains the configured audience
    /// 6. `exp` / `nbf` / `iat` within leeway
    ///
    /// # Errors
    ///
    /// `Malformed`, `BadSignature`, `IssuerMismatch`, `AudienceMismatch`,
    /// `Expired`, `NotYetValid`, or `ServiceError` when keys are unavailable.
    #[instrument(skip_all, name = "api.auth.oidc.validate")]
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<ProviderClaims, AuthError> {
        let (kid, header_alg) = peek_kid_and_alg(token).map_err(|e| {
            tracing::debug!(target: "api.auth.oidc", error = ?e, "Provider token header rejected");
            AuthError::from(e)
        })?;

        let jwk = self.jwks_client.get_key(&kid).await?;
        let (key, key_alg) = jwk.decoding_key()?;

        if header_alg != key_alg {
            tracing::debug!(target: "api.auth.oidc", header_alg = ?header_alg, key_alg = ?key_alg, "Algorithm does not match key");
            return Err(AuthError::BadSignature);
        }

        let mut validation = Validation::new(key_alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let claims = decode::<ProviderClaims>(token, &key, &validation)
            .map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        AuthError::BadSignature
                    }
                    _ => AuthError::Malformed,
                };
                tracing::debug!(target: "api.auth.oidc", error = %e, "Provider token verification failed");
                err
            })?
            .claims;

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            tracing::debug!(target: "api.auth.oidc", iss = ?claims.iss, "Provider token issuer mismatch");
            return Err(AuthError::IssuerMismatch);
        }

        if !claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.audience))
        {
            tracing::debug!(target: "api.auth.oidc", aud = ?claims.aud, "Provider token audience mismatch");
            return Err(AuthError::AudienceMismatch);
        }

        validate_time_window_at(claims.exp, claims.nbf, claims.iat, self.leeway, now)?;

        tracing::debug!(target: "api.auth.oidc", "Provider token validated");
        Ok(claims)
    }
}
