//! Per-scope API budget tracking and adaptive throttling.
//!
//! Each scope (installation / tenant) has its own hourly request budget
//! reported by the upstream `rateLimit` block. The tracker keeps the last
//! observed numbers per scope and derives three behaviors from them:
//! blocking waits when the budget is critical, proportional inter-request
//! delays when it is low, and page-size reduction for expensive queries.
//!
//! Reads and writes are lock-free. Fields update independently, which can
//! expose a snapshot mixing two responses for a moment; the consumers here
//! only ever use the numbers as throttling hints, so that is acceptable.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::RateLimitBlock;
use crate::cancel::CancelFlag;

/// Thresholds and wait bounds for budget-driven throttling.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Assumed hourly budget before the first response reports one.
    pub default_limit: i64,
    /// Below this, requests are spread out and page sizes shrink.
    pub low_threshold: i64,
    /// Below this, work pauses until the window resets.
    pub critical_threshold: i64,
    /// Shortest pause ever taken.
    pub min_wait: Duration,
    /// Longest pause ever taken, regardless of reported reset time.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 5000,
            low_threshold: 500,
            critical_threshold: 100,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Last observed budget numbers for one scope. `reset_at_ms == 0` means the
/// reset time is not yet known.
#[derive(Debug)]
struct ScopeBudget {
    remaining: AtomicI64,
    limit: AtomicI64,
    used: AtomicI64,
    last_query_cost: AtomicI64,
    reset_at_ms: AtomicI64,
}

impl ScopeBudget {
    fn new(default_limit: i64) -> Self {
        Self {
            remaining: AtomicI64::new(default_limit),
            limit: AtomicI64::new(default_limit),
            used: AtomicI64::new(0),
            last_query_cost: AtomicI64::new(0),
            reset_at_ms: AtomicI64::new(0),
        }
    }
}

/// Point-in-time view of one scope's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub remaining: i64,
    pub limit: i64,
    pub used: i64,
    pub last_query_cost: i64,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Tracks budgets for any number of scopes concurrently.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    scopes: DashMap<Uuid, Arc<ScopeBudget>>,
    config: RateLimitConfig,
}

impl RateLimitTracker {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            scopes: DashMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn budget(&self, scope: Uuid) -> Arc<ScopeBudget> {
        self.scopes
            .entry(scope)
            .or_insert_with(|| Arc::new(ScopeBudget::new(self.config.default_limit)))
            .clone()
    }

    /// Record the budget numbers from a response's `rateLimit` block.
    pub fn update_from_response(&self, scope: Uuid, block: &RateLimitBlock) {
        let budget = self.budget(scope);
        budget.remaining.store(block.remaining, Ordering::Relaxed);
        budget.limit.store(block.limit, Ordering::Relaxed);
        budget.used.store(block.used, Ordering::Relaxed);
        budget.last_query_cost.store(block.cost, Ordering::Relaxed);
        budget
            .reset_at_ms
            .store(block.reset_at.timestamp_millis(), Ordering::Relaxed);
        debug!(
            %scope,
            remaining = block.remaining,
            cost = block.cost,
            "rate limit budget updated"
        );
    }

    /// Convenience wrapper: a `None` block is a no-op.
    pub fn observe(&self, scope: Uuid, block: Option<&RateLimitBlock>) {
        if let Some(block) = block {
            self.update_from_response(scope, block);
        }
    }

    /// Remaining budget for a scope, never negative.
    ///
    /// When the last reported reset time has passed and the budget looks
    /// low, the window has rolled over upstream, so remaining is
    /// optimistically restored to the full limit. The next response
    /// replaces the guess with real numbers.
    pub fn remaining(&self, scope: Uuid) -> i64 {
        let budget = self.budget(scope);
        let remaining = budget.remaining.load(Ordering::Relaxed).max(0);
        let reset_ms = budget.reset_at_ms.load(Ordering::Relaxed);
        if remaining < self.config.low_threshold
            && reset_ms != 0
            && reset_ms <= Utc::now().timestamp_millis()
        {
            let limit = budget.limit.load(Ordering::Relaxed);
            budget.remaining.store(limit, Ordering::Relaxed);
            info!(%scope, limit, "rate limit window rolled over, budget restored");
            return limit.max(0);
        }
        remaining
    }

    pub fn reset_at(&self, scope: Uuid) -> Option<DateTime<Utc>> {
        let ms = self.budget(scope).reset_at_ms.load(Ordering::Relaxed);
        if ms == 0 {
            return None;
        }
        Utc.timestamp_millis_opt(ms).single()
    }

    #[must_use]
    pub fn snapshot(&self, scope: Uuid) -> RateLimitSnapshot {
        let budget = self.budget(scope);
        RateLimitSnapshot {
            remaining: self.remaining(scope),
            limit: budget.limit.load(Ordering::Relaxed),
            used: budget.used.load(Ordering::Relaxed),
            last_query_cost: budget.last_query_cost.load(Ordering::Relaxed),
            reset_at: self.reset_at(scope),
        }
    }

    pub fn is_low(&self, scope: Uuid) -> bool {
        self.remaining(scope) < self.config.low_threshold
    }

    pub fn is_critical(&self, scope: Uuid) -> bool {
        self.remaining(scope) < self.config.critical_threshold
    }

    /// Block until the budget window resets if the scope is critical.
    ///
    /// Returns `true` if a wait happened (even one cut short by
    /// cancellation), `false` if no wait was needed. The pause is bounded
    /// by the configured min and max and wakes early on cancellation.
    pub async fn wait_if_needed(&self, scope: Uuid, cancel: &CancelFlag) -> bool {
        if !self.is_critical(scope) {
            return false;
        }

        let wait = match self.reset_at(scope) {
            Some(at) => {
                let until = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                until.clamp(self.config.min_wait, self.config.max_wait)
            }
            None => self.config.min_wait,
        };
        warn!(
            %scope,
            remaining = self.remaining(scope),
            wait_secs = wait.as_secs(),
            "rate limit budget critical, pausing"
        );
        cancel.sleep(wait).await;
        true
    }

    /// Delay to insert between requests to spread the remaining budget
    /// across the rest of the window. Zero while the budget is healthy.
    pub fn recommended_delay(&self, scope: Uuid) -> Duration {
        let remaining = self.remaining(scope);
        if remaining >= self.config.low_threshold {
            return Duration::ZERO;
        }
        let Some(reset_at) = self.reset_at(scope) else {
            return self.config.min_wait;
        };
        let until = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if until.is_zero() {
            return Duration::ZERO;
        }
        let headroom = (remaining - self.config.critical_threshold).max(1);
        let spread = until / u32::try_from(headroom).unwrap_or(1);
        spread.clamp(self.config.min_wait, self.config.max_wait)
    }

    /// Shrink a query's page size when the budget is under pressure.
    ///
    /// Full size while healthy, half (floor 10) while low, quarter
    /// (floor 5) while critical. Never exceeds `base`.
    pub fn adapt_page_size(&self, scope: Uuid, base: u32) -> u32 {
        let remaining = self.remaining(scope);
        if remaining >= self.config.low_threshold {
            base
        } else if remaining >= self.config.critical_threshold {
            base.min((base / 2).max(10))
        } else {
            base.min((base / 4).max(5))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn block(remaining: i64, limit: i64, cost: i64, reset_at: DateTime<Utc>) -> RateLimitBlock {
        RateLimitBlock {
            limit,
            cost,
            remaining,
            used: limit - remaining,
            reset_at,
        }
    }

    #[test]
    fn unknown_scope_starts_with_default_budget() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        assert_eq!(tracker.remaining(scope), 5000);
        assert!(!tracker.is_low(scope));
        assert!(!tracker.is_critical(scope));
        assert!(tracker.reset_at(scope).is_none());
    }

    #[test]
    fn update_replaces_budget_numbers() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let reset = Utc::now() + TimeDelta::minutes(20);
        tracker.update_from_response(scope, &block(4200, 5000, 12, reset));

        let snapshot = tracker.snapshot(scope);
        assert_eq!(snapshot.remaining, 4200);
        assert_eq!(snapshot.limit, 5000);
        assert_eq!(snapshot.used, 800);
        assert_eq!(snapshot.last_query_cost, 12);
        assert_eq!(
            snapshot.reset_at.map(|t| t.timestamp_millis()),
            Some(reset.timestamp_millis())
        );
    }

    #[test]
    fn scopes_are_tracked_independently() {
        let tracker = RateLimitTracker::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let reset = Utc::now() + TimeDelta::minutes(10);

        tracker.update_from_response(a, &block(50, 5000, 1, reset));
        tracker.update_from_response(b, &block(4000, 5000, 1, reset));

        assert!(tracker.is_critical(a));
        assert!(!tracker.is_low(b));
    }

    #[test]
    fn remaining_is_never_negative() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let reset = Utc::now() + TimeDelta::minutes(10);
        tracker.update_from_response(scope, &block(-3, 5000, 1, reset));
        assert_eq!(tracker.remaining(scope), 0);
    }

    #[test]
    fn past_reset_restores_budget_optimistically() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let past = Utc::now() - TimeDelta::seconds(5);
        tracker.update_from_response(scope, &block(50, 5000, 1, past));

        assert_eq!(tracker.remaining(scope), 5000);
        assert!(!tracker.is_critical(scope));
    }

    #[test]
    fn healthy_budget_past_reset_is_left_alone() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let past = Utc::now() - TimeDelta::seconds(5);
        tracker.update_from_response(scope, &block(3000, 5000, 1, past));
        assert_eq!(tracker.remaining(scope), 3000);
    }

    #[test]
    fn recommended_delay_zero_while_healthy() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let reset = Utc::now() + TimeDelta::minutes(30);
        tracker.update_from_response(scope, &block(2000, 5000, 1, reset));
        assert_eq!(tracker.recommended_delay(scope), Duration::ZERO);
    }

    #[test]
    fn recommended_delay_spreads_low_budget_over_window() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        // 300 remaining, 100 critical floor, 200s until reset: ~1s apart.
        let reset = Utc::now() + TimeDelta::seconds(200);
        tracker.update_from_response(scope, &block(300, 5000, 1, reset));

        let delay = tracker.recommended_delay(scope);
        assert!(delay >= Duration::from_millis(900), "delay was {delay:?}");
        assert!(delay <= Duration::from_millis(1100), "delay was {delay:?}");
    }

    #[test]
    fn recommended_delay_is_clamped_to_max_wait() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        // 101 remaining with nearly an hour left: raw spread exceeds the cap.
        let reset = Utc::now() + TimeDelta::minutes(55);
        tracker.update_from_response(scope, &block(101, 5000, 1, reset));
        assert_eq!(tracker.recommended_delay(scope), Duration::from_secs(300));
    }

    #[test]
    fn page_size_adapts_by_band() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let reset = Utc::now() + TimeDelta::minutes(30);

        tracker.update_from_response(scope, &block(2000, 5000, 1, reset));
        assert_eq!(tracker.adapt_page_size(scope, 50), 50);

        tracker.update_from_response(scope, &block(300, 5000, 1, reset));
        assert_eq!(tracker.adapt_page_size(scope, 50), 25);

        tracker.update_from_response(scope, &block(40, 5000, 1, reset));
        assert_eq!(tracker.adapt_page_size(scope, 50), 12);
    }

    #[test]
    fn adapted_page_size_respects_floors_and_base() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let reset = Utc::now() + TimeDelta::minutes(30);

        // Low band: half of 12 is below the floor of 10.
        tracker.update_from_response(scope, &block(300, 5000, 1, reset));
        assert_eq!(tracker.adapt_page_size(scope, 12), 10);
        // Floor never inflates past the base.
        assert_eq!(tracker.adapt_page_size(scope, 8), 8);

        // Critical band: quarter of 12 is below the floor of 5.
        tracker.update_from_response(scope, &block(40, 5000, 1, reset));
        assert_eq!(tracker.adapt_page_size(scope, 12), 5);
        assert_eq!(tracker.adapt_page_size(scope, 3), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_is_noop_while_healthy() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let cancel = CancelFlag::new();
        assert!(!tracker.wait_if_needed(scope, &cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_pauses_until_reset() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let reset = Utc::now() + TimeDelta::seconds(30);
        tracker.update_from_response(scope, &block(50, 5000, 1, reset));

        let started = tokio::time::Instant::now();
        assert!(tracker.wait_if_needed(scope, &cancel).await);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(29), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(31), "waited {waited:?}");
    }

    // Real clock: the optimistic rollover compares against wall time, so
    // the reset here is milliseconds out instead of seconds.
    #[tokio::test]
    async fn second_wait_after_reset_passes_is_a_noop() {
        let tracker = RateLimitTracker::new(RateLimitConfig {
            min_wait: Duration::from_millis(20),
            max_wait: Duration::from_millis(200),
            ..RateLimitConfig::default()
        });
        let scope = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let reset = Utc::now() + TimeDelta::milliseconds(50);
        tracker.update_from_response(scope, &block(50, 5000, 1, reset));

        assert!(tracker.wait_if_needed(scope, &cancel).await);

        // The pause outlasted the window, so the budget is restored and
        // an immediate second call does not block.
        assert!(!tracker.wait_if_needed(scope, &cancel).await);
        assert_eq!(tracker.remaining(scope), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_caps_long_resets_at_max_wait() {
        let tracker = RateLimitTracker::default();
        let scope = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let reset = Utc::now() + TimeDelta::hours(1);
        tracker.update_from_response(scope, &block(50, 5000, 1, reset));

        let started = tokio::time::Instant::now();
        assert!(tracker.wait_if_needed(scope, &cancel).await);
        assert!(started.elapsed() <= Duration::from_secs(301));
        assert!(started.elapsed() >= Duration::from_secs(299));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_uses_min_wait_when_reset_is_unknown() {
        let tracker = RateLimitTracker::new(RateLimitConfig {
            default_limit: 0,
            ..RateLimitConfig::default()
        });
        let scope = Uuid::new_v4();
        let cancel = CancelFlag::new();

        let started = tokio::time::Instant::now();
        assert!(tracker.wait_if_needed(scope, &cancel).await);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_returns_promptly_on_cancellation() {
        let tracker = std::sync::Arc::new(RateLimitTracker::default());
        let scope = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let reset = Utc::now() + TimeDelta::minutes(4);
        tracker.update_from_response(scope, &block(50, 5000, 1, reset));

        let waiter = {
            let tracker = tracker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { tracker.wait_if_needed(scope, &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_scopes() {
        let tracker = std::sync::Arc::new(RateLimitTracker::default());
        let scopes: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let reset = Utc::now() + TimeDelta::minutes(10);

        let mut handles = Vec::new();
        for &scope in &scopes {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    tracker.update_from_response(scope, &block(5000 - i, 5000, 1, reset));
                    let _ = tracker.remaining(scope);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        for &scope in &scopes {
            assert_eq!(tracker.remaining(scope), 4901);
        }
    }
}
