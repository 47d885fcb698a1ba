//! Strategy inputs and decision outputs.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Free-form metadata carried into results.
pub type Metadata = Map<String, Value>;

/// Everything a strategy needs to judge one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Caller-supplied scope identifier
    pub key: String,
    /// Maximum requests allowed in one window
    pub limit: u64,
    /// Window length, e.g. `"1m"`
    pub duration: String,
    /// Strategy name
    pub strategy: String,
    /// Reserved headroom; reported in metadata only
    pub burst: u64,
    /// Key namespace
    pub prefix: String,
    /// Caller metadata merged into results
    pub metadata: Metadata,
}

/// The outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub allowed: bool,
    /// `limit - value`, floored at zero
    pub remaining: u64,
    /// Window boundary in milliseconds since the Unix epoch
    pub reset_time: u64,
    pub limit: u64,
    pub key: String,
    /// Caller metadata overlaid with strategy bookkeeping
    pub metadata: Metadata,
}

impl RateLimitResult {
    /// The reset time as a UTC timestamp.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.reset_time)
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }

    /// Time from `now_ms` until the reset, zero if already past.
    pub fn retry_after(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.reset_time.saturating_sub(now_ms))
    }

    /// The strategy that produced this result, if recorded.
    pub fn strategy(&self) -> Option<&str> {
        self.metadata.get("strategy").and_then(Value::as_str)
    }
}

/// The headline fields of a [`RateLimitResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_time: u64,
    pub limit: u64,
}

impl From<&RateLimitResult> for RateLimitInfo {
    fn from(result: &RateLimitResult) -> Self {
        Self {
            allowed: result.allowed,
            remaining: result.remaining,
            reset_time: result.reset_time,
            limit: result.limit,
        }
    }
}
