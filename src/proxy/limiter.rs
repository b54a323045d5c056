//! Token bucket shared by every outbound Helix call

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::timeout;

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

pub struct OutboundLimiter {
    limiter: DefaultDirectRateLimiter,
    max_wait: Duration
}

impl OutboundLimiter {
    pub fn new(requests_per_minute: u32, burst: u32, max_wait: Duration) -> OutboundLimiter {
        let quota = Quota::per_minute(non_zero(requests_per_minute)).allow_burst(non_zero(burst));
        OutboundLimiter { limiter: RateLimiter::direct(quota), max_wait }
    }

    /// Waits for a token. Gives up with `false` after `max_wait`; dropping
    /// the future abandons the wait without consuming anything.
    pub async fn acquire(&self) -> bool {
        timeout(self.max_wait, self.limiter.until_ready()).await.is_ok()
    }

    /// Takes a token only if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
