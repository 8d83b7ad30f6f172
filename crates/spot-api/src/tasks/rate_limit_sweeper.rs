//! Rate-limit sweeper background task.
//!
//! Periodically drops client budgets that have been idle past the limiter's
//! cutoff, bounding memory under churn from many distinct clients.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled. A sweep in
//! progress always completes first.

use crate::services::rate_limiter::RateLimiter;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Run the sweeper until `cancel_token` is cancelled.
///
/// Spawned by [`RateLimiter::start`]; not normally called directly.
#[instrument(skip_all, name = "api.task.rate_limit_sweep")]
pub async fn start_rate_limit_sweeper(
    limiter: RateLimiter,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "api.task.rate_limit_sweep",
        interval_ms = sweep_interval.as_millis() as u64,
        idle_cutoff_ms = limiter.idle_cutoff().as_millis() as u64,
        "Starting rate-limit sweeper"
    );

    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&limiter, Instant::now());
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "api.task.rate_limit_sweep",
                    "Rate-limit sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "api.task.rate_limit_sweep", "Rate-limit sweeper stopped");
}

/// One sweep iteration. Returns the number of budgets removed.
pub(crate) fn run_sweep(limiter: &RateLimiter, now: Instant) -> usize {
    let removed = limiter.sweep_at(now);
    if removed > 0 {
        debug!(
            target: "api.task.rate_limit_sweep",
            removed,
            remaining = limiter.tracked_clients(),
            "Swept idle rate-limit budgets"
        );
    }
    removed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_run_sweep_reports_removed() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("a", start);
        limiter.check_at("b", start);

        assert_eq!(run_sweep(&limiter, start + Duration::from_secs(5)), 0);
        assert_eq!(run_sweep(&limiter, start + Duration::from_secs(16)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_exits_on_cancel() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(start_rate_limit_sweeper(
            limiter,
            Duration::from_secs(10),
            cancel_token.clone(),
        ));

        tokio::time::advance(Duration::from_secs(25)).await;
        cancel_token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit after cancel")
            .unwrap();
    }
}
