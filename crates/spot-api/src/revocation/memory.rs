//! In-process revocation store.
//!
//! Entries live only as long as the process, so this store is correct only
//! when a single instance serves all traffic.

use super::{RevocationEntry, RevocationError, RevocationStore};
use crate::auth::claims::TokenKind;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Revocation store backed by a `HashMap` under a read/write lock.
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: RwLock<HashMap<String, RevocationEntry>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose original token has expired. Returns how many were
    /// removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();

        if removed > 0 {
            tracing::debug!(target: "api.revocation", removed, "Purged expired revocations");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(entries.contains_key(jti))
    }

    async fn revoke(
        &self,
        jti: &str,
        user_id: &str,
        kind: TokenKind,
        expires_at: i64,
    ) -> Result<bool, RevocationError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // First revocation wins; repeats are no-ops.
        match entries.entry(jti.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(RevocationEntry {
                    jti: jti.to_string(),
                    user_id: user_id.to_string(),
                    kind,
                    expires_at,
                });
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unknown_jti_not_revoked() {
        let store = MemoryRevocationStore::new();
        assert!(!store.is_revoked("never-seen").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_then_check() {
        let store = MemoryRevocationStore::new();
        store
            .revoke("jti-a", "u1", TokenKind::Access, 2_000_000_000)
            .await
            .unwrap();

        assert!(store.is_revoked("jti-a").await.unwrap());
        assert!(!store.is_revoked("jti-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = MemoryRevocationStore::new();
        assert!(store
            .revoke("jti-a", "u1", TokenKind::Access, 2_000_000_000)
            .await
            .unwrap());
        assert!(!store
            .revoke("jti-a", "u1", TokenKind::Access, 2_000_000_000)
            .await
            .unwrap());

        assert!(store.is_revoked("jti-a").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_revokes_yield_one_entry() {
        let store = Arc::new(MemoryRevocationStore::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .revoke("shared", "u1", TokenKind::Refresh, 2_000_000_000)
                        .await
                })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_entries() {
        let store = MemoryRevocationStore::new();
        store
            .revoke("old", "u1", TokenKind::Access, 100)
            .await
            .unwrap();
        store
            .revoke("live", "u1", TokenKind::Access, 300)
            .await
            .unwrap();

        assert_eq!(store.purge_expired(200), 1);
        assert!(!store.is_revoked("old").await.unwrap());
        assert!(store.is_revoked("live").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_not_purged_at_exact_expiry_boundary() {
        let store = MemoryRevocationStore::new();
        store
            .revoke("edge", "u1", TokenKind::Access, 200)
            .await
            .unwrap();

        // exp == now is already expired, so the entry can go
        assert_eq!(store.purge_expired(200), 1);
        assert!(store.is_empty());
    }
}
