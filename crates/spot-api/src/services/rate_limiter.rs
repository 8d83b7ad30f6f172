//! Per-client fixed-window rate limiter.
//!
//! A client's window opens with its first request and lasts `W`. Within the
//! window at most `N` requests are admitted; the `(N+1)`th is the first
//! rejection. Once more than `W` has passed since the window opened, the next
//! request opens a new window and counts as 1.
//!
//! # Concurrency
//!
//! Budgets live in a map behind a read/write lock, each under its own mutex.
//! A check holds the map's read lock for its whole duration (the write lock
//! when it inserts a new client), so the sweeper, which takes the write lock,
//! can never remove a budget that a check is updating. Decision and update
//! happen under one mutex acquisition.
//!
//! # Lifecycle
//!
//! The limiter is an owned value. [`RateLimiter::start`] spawns the idle
//! sweeper; [`RateLimiter::stop`] cancels and joins it.

use crate::observability::metrics;
use crate::tasks::rate_limit_sweeper::start_rate_limit_sweeper;
use common::jwt::unix_now;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Configured budget `N`.
    pub limit: u32,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Seconds a rejected client should wait, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        let rounded = if self.reset_after.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        };
        rounded.max(1)
    }

    /// Unix time at which the current window closes.
    pub fn reset_at_epoch_secs(&self) -> i64 {
        let wait = i64::try_from(self.retry_after_secs()).unwrap_or(i64::MAX);
        unix_now().saturating_add(wait)
    }
}

#[derive(Debug)]
struct ClientBudget {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

impl ClientBudget {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            last_seen: now,
        }
    }

    fn admit(&mut self, limit: u32, window: Duration, now: Instant) -> RateLimitDecision {
        if now.saturating_duration_since(self.window_start) > window {
            self.window_start = now;
            self.count = 0;
        }
        self.last_seen = now;

        let allowed = self.count < limit;
        if allowed {
            self.count += 1;
        }

        RateLimitDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(self.count),
            reset_after: window.saturating_sub(now.saturating_duration_since(self.window_start)),
        }
    }
}

struct Inner {
    limit: u32,
    window: Duration,
    budgets: RwLock<HashMap<String, Mutex<ClientBudget>>>,
    sweeper: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Fixed-window limiter keyed by client identity. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.inner.limit)
            .field("window", &self.inner.window)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window`.
    ///
    /// The sweeper is not running until [`RateLimiter::start`] is called.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                limit,
                window,
                budgets: RwLock::new(HashMap::new()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.inner.limit
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Budgets idle for longer than this are swept: `W + max(W/2, 1s)`.
    pub fn idle_cutoff(&self) -> Duration {
        let margin = (self.inner.window / 2).max(Duration::from_secs(1));
        self.inner.window.saturating_add(margin)
    }

    /// Whether the next request from `client` is admitted.
    pub fn allow(&self, client: &str) -> bool {
        self.check(client).allowed
    }

    /// Admission decision for `client` at the current time.
    pub fn check(&self, client: &str) -> RateLimitDecision {
        self.check_at(client, Instant::now())
    }

    /// Admission decision for `client` as of `now`.
    pub fn check_at(&self, client: &str, now: Instant) -> RateLimitDecision {
        let (limit, window) = (self.inner.limit, self.inner.window);

        let decision = {
            let budgets = self
                .inner
                .budgets
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            budgets.get(client).map(|budget| {
                budget
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .admit(limit, window, now)
            })
        };

        let decision = match decision {
            Some(decision) => decision,
            None => {
                let mut budgets = self
                    .inner
                    .budgets
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                // Another request may have inserted between the two locks
                let decision = budgets
                    .entry(client.to_string())
                    .or_insert_with(|| Mutex::new(ClientBudget::new(now)))
                    .get_mut()
                    .unwrap_or_else(PoisonError::into_inner)
                    .admit(limit, window, now);
                metrics::set_tracked_clients(budgets.len());
                decision
            }
        };

        metrics::record_rate_limit_decision(decision.allowed);
        if !decision.allowed {
            tracing::debug!(
                target: "api.middleware.rate_limit",
                limit,
                retry_after_secs = decision.retry_after_secs(),
                "Request rejected by rate limiter"
            );
        }
        decision
    }

    /// Remove budgets idle past [`RateLimiter::idle_cutoff`] as of `now`.
    /// Returns the number removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let cutoff = self.idle_cutoff();
        let mut budgets = self
            .inner
            .budgets
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let before = budgets.len();
        budgets.retain(|_, budget| {
            let budget = budget.get_mut().unwrap_or_else(PoisonError::into_inner);
            now.saturating_duration_since(budget.last_seen) <= cutoff
        });
        let removed = before - budgets.len();
        metrics::set_tracked_clients(budgets.len());
        removed
    }

    /// Number of clients currently holding a budget.
    pub fn tracked_clients(&self) -> usize {
        self.inner
            .budgets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Spawn the sweeper. Must be called inside a Tokio runtime. A second
    /// call while running is a no-op.
    pub fn start(&self) {
        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(start_rate_limit_sweeper(
            self.clone(),
            self.inner.window,
            cancel_token.clone(),
        ));
        *sweeper = Some((cancel_token, handle));
    }

    /// Whether the sweeper is running.
    pub fn is_running(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancel the sweeper and wait for it to exit. No-op if not running.
    pub async fn stop(&self) {
        let running = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some((cancel_token, handle)) = running {
            cancel_token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(target: "api.task.rate_limit_sweep", error = %e, "Sweeper task did not exit cleanly");
            }
        }
    }
}
