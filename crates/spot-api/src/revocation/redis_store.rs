//! Redis-backed revocation store.
//!
//! # Key Patterns
//!
//! - `revoked:{jti}` - JSON [`RevocationEntry`], expires with the token
//!
//! Redis expiry is the garbage collector: each key's TTL is the remaining
//! lifetime of the revoked token (at least one second).
//!
//! The `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so each call clones it rather than locking.

use super::{RevocationEntry, RevocationError, RevocationStore};
use crate::auth::claims::TokenKind;
use async_trait::async_trait;
use common::jwt::unix_now;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::instrument;

const KEY_PREFIX: &str = "revoked:";

fn revocation_key(jti: &str) -> String {
    format!("{KEY_PREFIX}{jti}")
}

/// TTL for a revocation key: the token's remaining lifetime, never below 1s.
fn ttl_seconds(expires_at: i64, now: i64) -> u64 {
    u64::try_from(expires_at.saturating_sub(now))
        .unwrap_or(0)
        .max(1)
}

/// Revocation store shared by every instance through Redis.
#[derive(Clone)]
pub struct RedisRevocationStore {
    connection: MultiplexedConnection,
}

impl RedisRevocationStore {
    /// Open a multiplexed connection to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns `RevocationError::Unavailable` if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self, RevocationError> {
        // Never log redis_url: it may carry a password
        let client = Client::open(redis_url).map_err(|e| {
            tracing::error!(target: "api.revocation", error = %e, "Failed to open Redis client");
            RevocationError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                tracing::error!(target: "api.revocation", error = %e, "Failed to connect to Redis");
                RevocationError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        tracing::info!(target: "api.revocation", "Connected to Redis revocation store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    #[instrument(skip_all, name = "api.revocation.is_revoked")]
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let mut conn = self.connection.clone();

        let exists: bool = conn.exists(revocation_key(jti)).await.map_err(|e| {
            tracing::warn!(target: "api.revocation", error = %e, "Revocation lookup failed");
            RevocationError::Backend(format!("EXISTS failed: {e}"))
        })?;

        Ok(exists)
    }

    #[instrument(skip_all, name = "api.revocation.revoke")]
    async fn revoke(
        &self,
        jti: &str,
        user_id: &str,
        kind: TokenKind,
        expires_at: i64,
    ) -> Result<bool, RevocationError> {
        let entry = RevocationEntry {
            jti: jti.to_string(),
            user_id: user_id.to_string(),
            kind,
            expires_at,
        };
        let value = serde_json::to_string(&entry)
            .map_err(|e| RevocationError::Backend(format!("Failed to encode entry: {e}")))?;

        let mut conn = self.connection.clone();

        // NX keeps the first entry: "OK" when set, nil when the key exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(revocation_key(jti))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(expires_at, unix_now()))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(target: "api.revocation", error = %e, "Revocation write failed");
                RevocationError::Backend(format!("SET failed: {e}"))
            })?;

        Ok(reply.is_some())
    }
}
