//! API budget tracking and request pacing.

pub mod throttle;
pub mod tracker;

pub use throttle::{ScopePacer, DEFAULT_REQUESTS_PER_SECOND};
pub use tracker::{RateLimitConfig, RateLimitSnapshot, RateLimitTracker};
