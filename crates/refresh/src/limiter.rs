//! Rate limiter for forced refreshes.
//!
//! One forced reload per minute, with a burst of one so the very first force
//! always goes through.

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket guarding cache invalidation.
#[derive(Debug, Clone)]
pub struct ForceLimiter {
    limiter: Arc<DirectLimiter>,
}

impl ForceLimiter {
    /// One token every 60 seconds.
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(60))
    }

    /// One token per `period`, bucket capacity 1. A zero period falls back
    /// to one token per second.
    pub fn with_period(period: Duration) -> Self {
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Take a token without waiting. Returns true if one was available.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for ForceLimiter {
    fn default() -> Self {
        Self::new()
    }
}
