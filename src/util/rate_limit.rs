//! Rate limiting for inbound socket traffic

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified messages per second
pub fn create_limiter(per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max inbound messages per second per connection.
///
/// Clients resend `playerInput` on every key change, so this sits well above
/// the tick rate.
pub const INPUT_RATE_LIMIT: u32 = 60;

/// Max chat messages per second per connection
pub const CHAT_RATE_LIMIT: u32 = 2;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    input_limiter: Arc<Limiter>,
    chat_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
            chat_limiter: create_limiter(CHAT_RATE_LIMIT),
        }
    }

    /// Check if an inbound message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    pub fn check_chat(&self) -> bool {
        self.chat_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_burst_is_cut_off() {
        let limiter = ConnectionRateLimiter::new();
        assert!(limiter.check_chat());
        assert!(limiter.check_chat());
        assert!(!limiter.check_chat());
        // Chat quota does not consume input quota
        assert!(limiter.check_input());
    }
}
