//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::race::model::TriggerKey;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified events per second
pub fn create_limiter(events_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(events_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Trigger key presses forwarded per key per second; absorbs auto-repeat
pub const TRIGGER_RATE_LIMIT: u32 = 10;

/// Per-trigger-key rate limiter state
#[derive(Clone)]
pub struct TriggerRateLimiter {
    limiters: HashMap<TriggerKey, Arc<Limiter>>,
}

impl TriggerRateLimiter {
    pub fn new(events_per_second: u32) -> Self {
        let limiters = TriggerKey::ALL
            .iter()
            .map(|key| (*key, create_limiter(events_per_second)))
            .collect();
        Self { limiters }
    }

    /// Check if a press of `key` is allowed (returns true if allowed)
    pub fn check(&self, key: TriggerKey) -> bool {
        self.limiters
            .get(&key)
            .map(|limiter| limiter.check().is_ok())
            .unwrap_or(true)
    }
}

impl Default for TriggerRateLimiter {
    fn default() -> Self {
        Self::new(TRIGGER_RATE_LIMIT)
    }
}
