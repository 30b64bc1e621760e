//! Backoff policy for retrying failed upstream requests.
//!
//! The shape is exponential with full jitter: a uniform random delay is
//! added on top of the exponential component, and the sum is clamped to the
//! configured maximum. The retry loops themselves live in the pagination
//! engine, which pairs this policy with the failure classifier.

use std::cmp;
use std::time::Duration;

use rand::Rng;

/// Base delay for the first retry attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Hard cap on any single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Upper bound of the uniform jitter added to each delay.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Exponent clamp. Keeps `base << attempt` from overflowing; changing this
/// requires re-deriving `DEFAULT_MAX_DELAY` so the cap still dominates.
pub const DEFAULT_EXPONENT_CAP: u32 = 6;

/// Exponential backoff with full jitter.
///
/// `delay(n) = min(base * 2^min(n, exponent_cap) + uniform(0..=max_jitter), max)`
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay for attempt 0, doubled each attempt.
    pub base: Duration,
    /// Clamp applied after jitter.
    pub max: Duration,
    /// Upper bound of the uniform jitter term.
    pub max_jitter: Duration,
    /// Clamp on the doubling exponent.
    pub exponent_cap: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            exponent_cap: DEFAULT_EXPONENT_CAP,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with custom bounds and the default exponent clamp.
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_jitter: Duration) -> Self {
        Self {
            base,
            max,
            max_jitter,
            exponent_cap: DEFAULT_EXPONENT_CAP,
        }
    }

    /// Policy without jitter, useful for deterministic tests.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// Compute the delay before retry attempt `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = cmp::min(attempt, self.exponent_cap);
        let exponential = self.base.saturating_mul(1u32 << exponent);

        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };

        cmp::min(exponential.saturating_add(jitter), self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base, Duration::from_secs(1));
        assert_eq!(policy.max, Duration::from_secs(60));
        assert_eq!(policy.max_jitter, Duration::from_secs(1));
        assert_eq!(policy.exponent_cap, 6);
    }

    #[test]
    fn exponential_component_is_monotone_then_capped() {
        let policy = BackoffPolicy::default().without_jitter();

        let mut previous = Duration::ZERO;
        for attempt in 0..=6 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "delay regressed at attempt {attempt}");
            previous = delay;
        }

        // Past the exponent cap every delay is identical.
        let capped = policy.delay(6);
        for attempt in 7..20 {
            assert_eq!(policy.delay(attempt), capped);
        }
    }

    #[test]
    fn doubles_from_the_base_delay() {
        let policy = BackoffPolicy::default().without_jitter();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
    }

    #[test]
    fn jitter_never_exceeds_max() {
        let policy = BackoffPolicy::default();
        for attempt in 0..20 {
            for _ in 0..50 {
                assert!(policy.delay(attempt) <= policy.max);
            }
        }
    }

    #[test]
    fn jitter_stays_within_configured_bound() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(100),
            Duration::from_secs(60),
            Duration::from_millis(250),
        );
        for _ in 0..100 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(350));
        }
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = BackoffPolicy::default().without_jitter();
        assert_eq!(policy.delay(u32::MAX), policy.delay(6));
    }
}
