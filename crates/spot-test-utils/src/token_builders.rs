//! Builder patterns for test tokens
//!
//! Tokens from `TokenIssuer` are always well-formed. These builders produce
//! the malformed, mis-addressed and out-of-window tokens admission must
//! reject.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Signing secret used by [`crate::TestSpotServer`].
pub const TEST_JWT_SECRET: &str = "spot-test-signing-secret-0123456789abcdef";

/// Issuer and audience used by [`crate::TestSpotServer`].
pub const TEST_ISSUER: &str = "spot-api";
pub const TEST_AUDIENCE: &str = "spot-api";

/// Builder for self-issued (HS256) token claims
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::access()
///     .for_user("alice")
///     .expires_in(-60)
///     .sign(TEST_JWT_SECRET);
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    fn with_kind(kind: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-user"));
        claims.insert("email".to_string(), json!("test-user@example.com"));
        claims.insert("token_type".to_string(), json!(kind));
        claims.insert("jti".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("nbf".to_string(), json!(now));
        claims.insert("exp".to_string(), json!(now + 3600));
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        Self { claims }
    }

    /// Access token claims valid for one hour.
    pub fn access() -> Self {
        Self::with_kind("access")
    }

    /// Refresh token claims valid for one hour.
    pub fn refresh() -> Self {
        Self::with_kind("refresh")
    }

    /// Set the subject
    pub fn for_user(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", json!(Utc::now().timestamp() + seconds))
    }

    /// Set not-before in seconds from now (positive for not yet valid)
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.claim("nbf", json!(Utc::now().timestamp() + seconds))
    }

    pub fn with_issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    pub fn with_audience(self, audience: &str) -> Self {
        self.claim("aud", json!(audience))
    }

    pub fn with_jti(self, jti: &str) -> Self {
        self.claim("jti", json!(jti))
    }

    /// Set or replace any claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim entirely
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// The claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Sign with HS256 and `secret`
    pub fn sign(self, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &self.build(),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 signing of test claims should succeed")
    }
}

/// Builder for external identity provider token claims
///
/// # Example
/// ```rust,ignore
/// let claims = ProviderClaimsBuilder::new("https://idp.example.com", "spot-web")
///     .for_subject("alice")
///     .build();
/// let token = keypair.sign_token(&claims)?;
/// ```
pub struct ProviderClaimsBuilder {
    claims: Map<String, Value>,
}

impl ProviderClaimsBuilder {
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("provider-user"));
        claims.insert("email".to_string(), json!("provider-user@example.com"));
        claims.insert("iss".to_string(), json!(issuer));
        claims.insert("aud".to_string(), json!(audience));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("nbf".to_string(), json!(now));
        claims.insert("exp".to_string(), json!(now + 3600));
        Self { claims }
    }

    pub fn for_subject(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", json!(Utc::now().timestamp() + seconds))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.claim("nbf", json!(Utc::now().timestamp() + seconds))
    }

    /// Set or replace any claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_builder_defaults() {
        let claims = TestTokenBuilder::access().for_user("alice").build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["token_type"], "access");
        assert!(claims["jti"].is_string());
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn test_without_removes_claim() {
        let claims = TestTokenBuilder::refresh().without("jti").build();
        assert!(claims.get("jti").is_none());
        assert_eq!(claims["token_type"], "refresh");
    }

    #[test]
    fn test_provider_builder_overrides() {
        let claims = ProviderClaimsBuilder::new("https://idp", "aud")
            .for_subject("bob")
            .claim("aud", json!(["other", "aud"]))
            .build();

        assert_eq!(claims["sub"], "bob");
        assert_eq!(claims["aud"][1], "aud");
    }
}
