//! Windowing strategies.
//!
//! Every strategy applies the same arithmetic to the post-increment counter
//! (`allowed` iff `current <= limit`); they differ in how they place the
//! window and therefore in the reset time they report.

mod approximated;
mod fixed_window;
mod registry;
mod sliding_window;

pub use approximated::{ApproximatedSlidingWindow, SUB_WINDOW_COUNT};
pub use fixed_window::FixedWindow;
pub use registry::StrategyRegistry;
pub use sliding_window::SlidingWindow;

use serde_json::Value;

use crate::duration::parse_duration;
use crate::error::{QuotagateError, Result};
use crate::ratelimit::{RateLimitConfig, RateLimitResult};

/// Name of the fixed window strategy.
pub const FIXED_WINDOW: &str = "fixed-window";
/// Name of the counter-based sliding window strategy.
pub const SLIDING_WINDOW: &str = "sliding-window";
/// Name of the sub-window bucketed sliding window strategy.
pub const APPROXIMATED_SLIDING_WINDOW: &str = "approximated-sliding-window";

/// A decision algorithm turning a raw counter into a [`RateLimitResult`].
pub trait Strategy: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Judge `current`, the counter value after this request was counted.
    fn check(&self, current: u64, config: &RateLimitConfig) -> Result<RateLimitResult>;

    /// Whether a window boundary was crossed at the current instant.
    fn should_reset(&self, current: u64, config: &RateLimitConfig) -> Result<bool>;
}

/// Window length of `config` in milliseconds; zero-length windows are rejected.
pub(crate) fn window_size(config: &RateLimitConfig) -> Result<u64> {
    let size = parse_duration(&config.duration)?;
    if size == 0 {
        return Err(QuotagateError::EmptyWindow {
            duration: config.duration.clone(),
        });
    }
    Ok(size)
}

/// Build a result from the shared allow/deny arithmetic.
///
/// Caller metadata is copied first, then `burst`, `strategy` and the
/// strategy's window fields overwrite any key of the same name.
pub(crate) fn decide(
    strategy: &str,
    current: u64,
    config: &RateLimitConfig,
    reset_time: u64,
    window_fields: impl IntoIterator<Item = (&'static str, Value)>,
) -> RateLimitResult {
    let mut metadata = config.metadata.clone();
    metadata.insert("burst".to_string(), Value::from(config.burst));
    metadata.insert("strategy".to_string(), Value::from(strategy));
    for (field, value) in window_fields {
        metadata.insert(field.to_string(), value);
    }

    RateLimitResult {
        allowed: current <= config.limit,
        remaining: config.limit.saturating_sub(current),
        reset_time,
        limit: config.limit,
        key: config.key.clone(),
        metadata,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ratelimit::{Metadata, RateLimitConfig};

    /// 2001-09-09T01:46:40Z, a round number of milliseconds.
    pub const T0: u64 = 1_000_000_000_000;

    pub fn config(limit: u64, duration: &str) -> RateLimitConfig {
        RateLimitConfig {
            key: "test".to_string(),
            limit,
            duration: duration.to_string(),
            strategy: String::new(),
            burst: 0,
            prefix: String::new(),
            metadata: Metadata::new(),
        }
    }
}
