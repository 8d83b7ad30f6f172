//! Self-issued token minting and verification (HS256).
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only HS256 is accepted; any other `alg` is a signature failure
//! - Issuer and audience are pinned to configuration
//! - Expiry is NOT enforced here. Callers decide; the admission middleware
//!   rejects expired tokens as its own step

use crate::auth::claims::{Claims, TokenKind};
use crate::errors::AuthError;
use common::jwt::{check_token_size, unix_now};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// Mints and verifies tokens with a process-lifetime symmetric secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(
        secret: &SecretString,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let secret_bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret_bytes),
            decoding_key: DecodingKey::from_secret(secret_bytes),
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Lifetime of access tokens.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Lifetime of refresh tokens.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an `access` token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenIssuance` if signing fails.
    pub fn issue_access_token(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        self.issue_at(user_id, email, TokenKind::Access, unix_now())
    }

    /// Issue a `refresh` token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenIssuance` if signing fails.
    pub fn issue_refresh_token(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        self.issue_at(user_id, email, TokenKind::Refresh, unix_now())
    }

    /// Issue a token of `kind` as if the current time were `now`.
    ///
    /// Every call draws a fresh v4 `jti`, so identical inputs never produce
    /// identical tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenIssuance` if signing fails.
    #[instrument(skip_all, fields(kind = %kind), name = "api.auth.issue")]
    pub fn issue_at(
        &self,
        user_id: &str,
        email: &str,
        kind: TokenKind,
        now: i64,
    ) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl_secs),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| {
                tracing::error!(target: "api.auth.token", error = %e, "Failed to sign token");
                AuthError::TokenIssuance("Failed to sign token".to_string())
            })?;

        tracing::debug!(target: "api.auth.token", kind = %kind, "Token issued");
        Ok(token)
    }

    /// Verify signature, algorithm, issuer, audience and structure.
    ///
    /// Expired tokens are returned as valid claims; check
    /// [`Claims::is_expired_at`] separately.
    ///
    /// # Errors
    ///
    /// - `Malformed` - oversized, unparseable, or missing required claims
    /// - `BadSignature` - signature or algorithm mismatch
    /// - `IssuerMismatch` / `AudienceMismatch` - not minted for this service
    #[instrument(skip_all, name = "api.auth.validate")]
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        check_token_size(token)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            let err = match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::BadSignature
                }
                ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
                ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
                _ => AuthError::Malformed,
            };
            tracing::debug!(target: "api.auth.token", error = %e, kind = err.kind(), "Token verification failed");
            err
        })?;

        Ok(data.claims)
    }
}
