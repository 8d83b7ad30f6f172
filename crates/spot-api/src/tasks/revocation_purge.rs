//! Purge task for the in-memory revocation store.
//!
//! Entries are only needed until the revoked token would have expired
//! anyway. Admission never depends on this task having run. The Redis store
//! expires its own keys and does not use it.

use crate::revocation::MemoryRevocationStore;
use common::jwt::unix_now;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Default interval between purges.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Run purges every `purge_interval` until `cancel_token` is cancelled.
#[instrument(skip_all, name = "api.task.revocation_purge")]
pub async fn start_revocation_purge(
    store: Arc<MemoryRevocationStore>,
    purge_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "api.task.revocation_purge",
        interval_ms = purge_interval.as_millis() as u64,
        "Starting revocation purge task"
    );

    let mut interval = tokio::time::interval(purge_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.purge_expired(unix_now());
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "api.task.revocation_purge",
                    "Revocation purge task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "api.task.revocation_purge", "Revocation purge task stopped");
}
