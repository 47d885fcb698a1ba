//! Counter-based sliding window strategy.

use serde_json::Value;

use super::{decide, window_size, Strategy, SLIDING_WINDOW};
use crate::clock::{system_clock, SharedClock};
use crate::error::Result;
use crate::ratelimit::{RateLimitConfig, RateLimitResult};

/// Treats the store's counter as the count of requests in `[now - window, now]`.
///
/// No per-request timestamps are kept. Because each increment re-anchors the
/// counter's TTL, the counter empties only after a full window of silence.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    clock: SharedClock,
}

impl SlidingWindow {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl Strategy for SlidingWindow {
    fn name(&self) -> &str {
        SLIDING_WINDOW
    }

    fn check(&self, current: u64, config: &RateLimitConfig) -> Result<RateLimitResult> {
        let now = self.clock.now_millis();
        let window = window_size(config)?;
        let window_start = now.saturating_sub(window);

        Ok(decide(
            SLIDING_WINDOW,
            current,
            config,
            now,
            [
                ("windowStart", Value::from(window_start)),
                ("windowEnd", Value::from(now)),
                ("windowSize", Value::from(window)),
            ],
        ))
    }

    fn should_reset(&self, _current: u64, config: &RateLimitConfig) -> Result<bool> {
        // A continuously moving window has no boundary to cross
        window_size(config)?;
        Ok(false)
    }
}
