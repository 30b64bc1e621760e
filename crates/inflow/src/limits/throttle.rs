//! Request pacing, independent of the budget tracker.
//!
//! The tracker reacts to reported budget numbers; the pacer enforces a flat
//! requests-per-second ceiling per scope so bursts never hammer the API
//! even while the budget is full.

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use uuid::Uuid;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

/// Per-scope request rate limiter.
pub struct ScopePacer {
    requests_per_second: NonZeroU32,
    limiters: DashMap<Uuid, Arc<DirectLimiter>>,
}

impl ScopePacer {
    /// A zero rate is treated as one request per second.
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        let requests_per_second =
            NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            requests_per_second,
            limiters: DashMap::new(),
        }
    }

    fn limiter(&self, scope: Uuid) -> Arc<DirectLimiter> {
        self.limiters
            .entry(scope)
            .or_insert_with(|| {
                // Burst of one keeps requests evenly spaced instead of
                // letting a full second's quota fire at once.
                let quota =
                    Quota::per_second(self.requests_per_second).allow_burst(NonZeroU32::MIN);
                Arc::new(RateLimiter::direct(quota))
            })
            .clone()
    }

    /// Wait until the scope is allowed to issue its next request.
    pub async fn wait(&self, scope: Uuid) {
        self.limiter(scope).until_ready().await;
    }
}

impl Default for ScopePacer {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_SECOND)
    }
}
