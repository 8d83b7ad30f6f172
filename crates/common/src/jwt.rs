//! JWT utilities shared across Spot Review services.
//!
//! This module provides the pieces of token validation that do not depend on
//! a particular key source:
//! - Size limits checked before any parsing
//! - Clock skew constants
//! - Unverified header inspection (`kid`, `alg`) for key lookup
//! - Time-window checks (`exp`, `nbf`, `iat`) against an explicit `now`
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header inspection never implies trust; the signature must still be
//!   verified with a key chosen by the caller
//! - Error messages are generic; details go to debug logs

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode_header, Algorithm};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical tokens are 300-600 bytes. Anything larger than this is rejected
/// before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors from the key-independent parts of JWT validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-part JWT with a decodable header.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// `exp` is in the past.
    #[error("The access token is invalid or expired")]
    Expired,

    /// `nbf` is in the future.
    #[error("The access token is invalid or expired")]
    NotYetValid,

    /// `iat` is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Reject tokens over [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `TokenTooLarge` if the token exceeds the limit.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Read the key ID and algorithm from a JWT header without verifying it.
///
/// Size is checked first. The returned values select a verification key and
/// must not be trusted for anything else.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds the size limit
/// - `MalformedToken` - not three parts, bad base64, or bad header JSON
/// - `MissingKid` - header has no `kid` or an empty one
pub fn peek_kid_and_alg(token: &str) -> Result<(String, Algorithm), JwtValidationError> {
    check_token_size(token)?;

    if token.split('.').count() != 3 {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    }

    let header = decode_header(token).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header");
        JwtValidationError::MalformedToken
    })?;

    let kid = header
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(JwtValidationError::MissingKid)?;

    Ok((kid, header.alg))
}

/// Check `exp`, `nbf` and `iat` against an explicit `now` with leeway.
///
/// - expired when `exp + leeway <= now`
/// - not yet valid when `nbf - leeway > now`
/// - rejected when `iat - leeway > now`
///
/// # Errors
///
/// Returns the first failing check as `Expired`, `NotYetValid` or
/// `IatTooFarInFuture`.
pub fn validate_time_window_at(
    exp: i64,
    nbf: Option<i64>,
    iat: Option<i64>,
    leeway: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Leeway is bounded to MAX_CLOCK_SKEW by config, well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let leeway_secs = leeway.as_secs() as i64;

    if exp.saturating_add(leeway_secs) <= now {
        tracing::debug!(target: "common.jwt", exp, now, "Token rejected: expired");
        return Err(JwtValidationError::Expired);
    }

    if let Some(nbf) = nbf {
        if nbf.saturating_sub(leeway_secs) > now {
            tracing::debug!(target: "common.jwt", nbf, now, "Token rejected: not yet valid");
            return Err(JwtValidationError::NotYetValid);
        }
    }

    if let Some(iat) = iat {
        if iat.saturating_sub(leeway_secs) > now {
            tracing::debug!(
                target: "common.jwt",
                iat,
                now,
                leeway_secs,
                "Token rejected: iat too far in the future"
            );
            return Err(JwtValidationError::IatTooFarInFuture);
        }
    }

    Ok(())
}

/// Decode the `x` member of an OKP JWK (base64url, no padding).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_okp_public_key(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
