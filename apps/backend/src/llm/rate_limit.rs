use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::config::RateLimitConfig;

/// Two non-blocking token buckets in front of the provider chain: one
/// shared across all users, one keyed by user id. A denial is reported
/// as `RATE_LIMITED`; nothing ever waits on a bucket.
pub struct RateGate {
    global: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    per_user: RateLimiter<i64, DefaultKeyedStateStore<i64>, DefaultClock>,
}

impl RateGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            global: RateLimiter::direct(Quota::per_minute(nonzero(config.global_per_minute))),
            per_user: RateLimiter::keyed(Quota::per_minute(nonzero(config.per_user_per_minute))),
        }
    }

    /// Take one token from both buckets. The per-user bucket is checked
    /// first so one saturated user cannot drain the global budget.
    pub fn try_acquire(&self, user_id: i64) -> bool {
        self.per_user.check_key(&user_id).is_ok() && self.global.check().is_ok()
    }
}

fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}
