//! Fixed window strategy.

use serde_json::Value;

use super::{decide, window_size, Strategy, FIXED_WINDOW};
use crate::clock::{system_clock, SharedClock};
use crate::error::Result;
use crate::ratelimit::{RateLimitConfig, RateLimitResult};

/// Windows aligned to multiples of the window size since the epoch.
///
/// Up to twice the limit can pass in a short span straddling two windows.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    clock: SharedClock,
}

impl FixedWindow {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

impl Default for FixedWindow {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl Strategy for FixedWindow {
    fn name(&self) -> &str {
        FIXED_WINDOW
    }

    fn check(&self, current: u64, config: &RateLimitConfig) -> Result<RateLimitResult> {
        let now = self.clock.now_millis();
        let window = window_size(config)?;
        let current_window = now / window;
        let window_start = current_window * window;
        let window_end = window_start + window;

        Ok(decide(
            FIXED_WINDOW,
            current,
            config,
            window_end,
            [
                ("windowStart", Value::from(window_start)),
                ("windowEnd", Value::from(window_end)),
                ("currentWindow", Value::from(current_window)),
            ],
        ))
    }

    fn should_reset(&self, _current: u64, config: &RateLimitConfig) -> Result<bool> {
        let now = self.clock.now_millis();
        let window = window_size(config)?;
        Ok(now % window == 0)
    }
}
