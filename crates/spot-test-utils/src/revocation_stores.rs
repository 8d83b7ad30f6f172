//! Revocation store doubles.

use async_trait::async_trait;
use spot_api::auth::TokenKind;
use spot_api::revocation::{RevocationError, RevocationStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store that fails every call, as if the backend were down.
#[derive(Debug, Default)]
pub struct UnavailableRevocationStore {
    calls: AtomicUsize,
}

impl UnavailableRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevocationStore for UnavailableRevocationStore {
    async fn is_revoked(&self, _jti: &str) -> Result<bool, RevocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RevocationError::Unavailable("connection refused".to_string()))
    }

    async fn revoke(
        &self,
        _jti: &str,
        _user_id: &str,
        _kind: TokenKind,
        _expires_at: i64,
    ) -> Result<bool, RevocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RevocationError::Unavailable("connection refused".to_string()))
    }
}

/// Store that answers "not revoked" only after `delay`.
#[derive(Debug)]
pub struct SlowRevocationStore {
    delay: Duration,
}

impl SlowRevocationStore {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl RevocationStore for SlowRevocationStore {
    async fn is_revoked(&self, _jti: &str) -> Result<bool, RevocationError> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }

    async fn revoke(
        &self,
        _jti: &str,
        _user_id: &str,
        _kind: TokenKind,
        _expires_at: i64,
    ) -> Result<bool, RevocationError> {
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }
}
