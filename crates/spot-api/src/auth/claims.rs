//! JWT claims structure for self-issued tokens.
//!
//! The `sub` and `email` fields are redacted in Debug output to prevent
//! exposure in logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a self-issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived bearer credential for API calls.
    Access,
    /// Long-lived credential exchanged for a new token pair.
    Refresh,
}

impl TokenKind {
    /// Wire and metric label form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by a self-issued token.
///
/// Invariant at issuance: `nbf <= iat < exp`. Immutable once issued.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Email of the subject - redacted in Debug output.
    pub email: String,

    /// Access or refresh.
    #[serde(rename = "token_type")]
    pub kind: TokenKind,

    /// Unique token identifier, the revocation key.
    ///
    /// Defaults to empty so a token minted without one still parses and is
    /// rejected by the admission layer rather than by the decoder.
    #[serde(default)]
    pub jti: String,

    /// Issued-at (Unix epoch seconds).
    pub iat: i64,

    /// Not-before (Unix epoch seconds).
    pub nbf: i64,

    /// Expiration (Unix epoch seconds).
    pub exp: i64,

    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: String,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("kind", &self.kind)
            .field("jti", &self.jti)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("exp", &self.exp)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .finish()
    }
}

impl Claims {
    /// A token is expired once `now` reaches `exp`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    /// Whether `now` is still before `nbf`.
    pub fn is_not_yet_valid_at(&self, now: i64) -> bool {
        now < self.nbf
    }

    /// Whether the token carries a revocation key.
    pub fn has_jti(&self) -> bool {
        !self.jti.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        Claims {
            sub: "user-42".to_string(),
            email: "reviewer@example.com".to_string(),
            kind: TokenKind::Access,
            jti: "5f0c1d2e-jti".to_string(),
            iat: 1_700_000_000,
            nbf: 1_700_000_000,
            exp: 1_700_086_400,
            iss: "spot-api".to_string(),
            aud: "spot-api".to_string(),
        }
    }

    #[test]
    fn test_claims_debug_redacts_identity() {
        let debug_str = format!("{:?}", sample_claims());

        assert!(!debug_str.contains("user-42"));
        assert!(!debug_str.contains("reviewer@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("5f0c1d2e-jti"));
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_value(sample_claims()).unwrap();
        assert_eq!(json["token_type"], "access");

        let mut refresh = sample_claims();
        refresh.kind = TokenKind::Refresh;
        let json = serde_json::to_value(refresh).unwrap();
        assert_eq!(json["token_type"], "refresh");
    }

    #[test]
    fn test_missing_jti_deserializes_to_empty() {
        let json = r#"{
            "sub": "u1", "email": "a@b.c", "token_type": "access",
            "iat": 1, "nbf": 1, "exp": 2, "iss": "i", "aud": "a"
        }"#;
        let claims: Claims = serde_json::from_str(json).unwrap();

        assert!(claims.jti.is_empty());
        assert!(!claims.has_jti());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{
            "sub": "u1", "email": "a@b.c", "token_type": "session",
            "jti": "x", "iat": 1, "nbf": 1, "exp": 2, "iss": "i", "aud": "a"
        }"#;
        assert!(serde_json::from_str::<Claims>(json).is_err());
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let claims = sample_claims();
        assert!(!claims.is_expired_at(claims.exp - 1));
        assert!(claims.is_expired_at(claims.exp));
        assert!(claims.is_expired_at(claims.exp + 1));
    }

    #[test]
    fn test_is_not_yet_valid_at_boundary() {
        let claims = sample_claims();
        assert!(claims.is_not_yet_valid_at(claims.nbf - 1));
        assert!(!claims.is_not_yet_valid_at(claims.nbf));
        assert!(!claims.is_not_yet_valid_at(claims.nbf + 1));
    }

    #[test]
    fn test_token_kind_display() {
        assert_eq!(TokenKind::Access.to_string(), "access");
        assert_eq!(TokenKind::Refresh.to_string(), "refresh");
    }
}
