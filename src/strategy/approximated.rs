//! Sub-window bucketed sliding window strategy.

use serde_json::Value;

use super::{decide, window_size, Strategy, APPROXIMATED_SLIDING_WINDOW};
use crate::clock::{system_clock, SharedClock};
use crate::error::Result;
use crate::ratelimit::{RateLimitConfig, RateLimitResult};

/// Number of equal sub-windows a window is divided into.
pub const SUB_WINDOW_COUNT: u64 = 10;

/// Aligns the window to sub-window boundaries, so it advances in steps of a
/// tenth of the window rather than a whole window.
#[derive(Debug, Clone)]
pub struct ApproximatedSlidingWindow {
    clock: SharedClock,
}

impl ApproximatedSlidingWindow {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    fn sub_window_size(window: u64) -> u64 {
        (window / SUB_WINDOW_COUNT).max(1)
    }
}

impl Default for ApproximatedSlidingWindow {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl Strategy for ApproximatedSlidingWindow {
    fn name(&self) -> &str {
        APPROXIMATED_SLIDING_WINDOW
    }

    fn check(&self, current: u64, config: &RateLimitConfig) -> Result<RateLimitResult> {
        let now = self.clock.now_millis();
        let window = window_size(config)?;
        let sub_window = Self::sub_window_size(window);

        let current_sub_window = now / sub_window;
        let window_start = current_sub_window * sub_window;
        let window_end = window_start + window;

        Ok(decide(
            APPROXIMATED_SLIDING_WINDOW,
            current,
            config,
            window_end,
            [
                ("windowStart", Value::from(window_start)),
                ("windowEnd", Value::from(window_end)),
                ("subWindowSize", Value::from(sub_window)),
                ("windowCount", Value::from(SUB_WINDOW_COUNT)),
                ("currentSubWindow", Value::from(current_sub_window)),
            ],
        ))
    }

    fn should_reset(&self, _current: u64, config: &RateLimitConfig) -> Result<bool> {
        let now = self.clock.now_millis();
        let sub_window = Self::sub_window_size(window_size(config)?);
        Ok(now % sub_window == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::strategy::test_support::{config, T0};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_sub_window_alignment() {
        let clock = ManualClock::new(T0 + 1_250);
        let strategy = ApproximatedSlidingWindow::new(Arc::new(clock.clone()));
        let result = strategy.check(1, &config(5, "10s")).unwrap();

        assert_eq!(result.metadata["subWindowSize"], json!(1_000));
        assert_eq!(result.metadata["windowCount"], json!(10));
        assert_eq!(result.metadata["currentSubWindow"], json!(T0 / 1_000 + 1));
        assert_eq!(result.metadata["windowStart"], json!(T0 + 1_000));
        assert_eq!(result.reset_time, T0 + 11_000);
    }

    #[test]
    fn test_window_advances_by_sub_window() {
        let clock = ManualClock::new(T0);
        let strategy = ApproximatedSlidingWindow::new(Arc::new(clock.clone()));
        let cfg = config(5, "10s");

        let first = strategy.check(1, &cfg).unwrap();
        clock.advance(Duration::from_millis(1_000));
        let second = strategy.check(2, &cfg).unwrap();

        assert_eq!(second.reset_time - first.reset_time, 1_000);
    }

    #[test]
    fn test_counts_over_time() {
        let clock = ManualClock::new(T0);
        let strategy = ApproximatedSlidingWindow::new(Arc::new(clock.clone()));
        let cfg = config(5, "10s");

        let steps = [
            (0, 1, true),
            (1_000, 2, true),
            (4_000, 5, true),
            (5_000, 6, false),
            (10_000, 4, true),
            (11_000, 6, false),
        ];
        for (offset, count, allowed) in steps {
            clock.set(T0 + offset);
            let result = strategy.check(count, &cfg).unwrap();
            assert_eq!(result.allowed, allowed, "count {} at +{}ms", count, offset);
        }
    }

    #[test]
    fn test_should_reset_on_sub_window_boundary() {
        let clock = ManualClock::new(T0 + 6_000);
        let strategy = ApproximatedSlidingWindow::new(Arc::new(clock.clone()));
        let cfg = config(5, "10s");

        assert!(strategy.should_reset(1, &cfg).unwrap());
        clock.advance(Duration::from_millis(10));
        assert!(!strategy.should_reset(1, &cfg).unwrap());
    }
}
