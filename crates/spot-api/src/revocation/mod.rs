//! Token revocation.
//!
//! The admission middleware depends only on the [`RevocationStore`] trait.
//! Two implementations are provided:
//! - [`MemoryRevocationStore`] for tests and single-instance deployments
//! - [`RedisRevocationStore`] shared by every instance
//!
//! Every call from the request path goes through [`with_timeout`] so a slow
//! store cannot stall admission. A store error is never read as "not revoked".

mod memory;
mod redis_store;

pub use memory::MemoryRevocationStore;
pub use redis_store::RedisRevocationStore;

use crate::auth::claims::TokenKind;
use crate::observability::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from a revocation store.
///
/// Messages never include the `jti` or the store's connection string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RevocationError {
    #[error("Revocation store unavailable: {0}")]
    Unavailable(String),

    #[error("Revocation store call timed out")]
    Timeout,

    #[error("Revocation store backend error: {0}")]
    Backend(String),
}

/// One revoked token.
///
/// Retained no longer than `expires_at`; after that the expiry check alone
/// rejects the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub jti: String,
    pub user_id: String,
    pub kind: TokenKind,
    /// Original token expiry (Unix seconds).
    pub expires_at: i64,
}

/// Capability consumed by the admission middleware.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Whether `jti` has been revoked.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot answer. Callers must treat
    /// that as a rejection.
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError>;

    /// Record a revocation. Idempotent: revoking the same `jti` twice succeeds
    /// both times and leaves one logical entry.
    ///
    /// Returns `true` only for the call that inserted the entry. The
    /// check and the insert are one atomic step, so among concurrent calls
    /// for one `jti` exactly one sees `true`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot record the entry.
    async fn revoke(
        &self,
        jti: &str,
        user_id: &str,
        kind: TokenKind,
        expires_at: i64,
    ) -> Result<bool, RevocationError>;
}

/// Run a store call with a deadline.
///
/// # Errors
///
/// Returns `RevocationError::Timeout` if `fut` does not complete within
/// `timeout`, otherwise whatever `fut` returns.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, RevocationError>
where
    F: Future<Output = Result<T, RevocationError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                target: "api.revocation",
                timeout_ms = timeout.as_millis() as u64,
                "Revocation store call timed out"
            );
            Err(RevocationError::Timeout)
        }
    }
}

/// Bounded `is_revoked` with metrics. This is the check the admission path
/// uses.
///
/// # Errors
///
/// Propagates store errors and timeouts.
pub async fn check_revoked(
    store: &dyn RevocationStore,
    jti: &str,
    timeout: Duration,
) -> Result<bool, RevocationError> {
    let start = Instant::now();
    let result = with_timeout(timeout, store.is_revoked(jti)).await;

    let status = match &result {
        Ok(true) => "revoked",
        Ok(false) => "clear",
        Err(RevocationError::Timeout) => "timeout",
        Err(_) => "error",
    };
    metrics::record_revocation_check(status, start.elapsed());

    result
}

/// Bounded `revoke` with metrics. Returns whether this call inserted the
/// entry.
///
/// # Errors
///
/// Propagates store errors and timeouts.
pub async fn revoke_token(
    store: &dyn RevocationStore,
    jti: &str,
    user_id: &str,
    kind: TokenKind,
    expires_at: i64,
    timeout: Duration,
) -> Result<bool, RevocationError> {
    let inserted = with_timeout(timeout, store.revoke(jti, user_id, kind, expires_at)).await?;
    if inserted {
        metrics::record_revocation(kind.as_str());
        tracing::info!(target: "api.revocation", kind = %kind, "Token revoked");
    } else {
        tracing::debug!(target: "api.revocation", kind = %kind, "Token already revoked");
    }
    Ok(inserted)
}
