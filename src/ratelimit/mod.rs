//! Rate limiting orchestration: keys, options, checks and results.

mod key;
mod limiter;
mod result;

pub use key::{scoped_key, validate_prefix, ScopedKey, KEY_SEPARATOR};
pub use limiter::{Hook, RateLimiter, RateLimiterOptions};
pub use result::{Metadata, RateLimitConfig, RateLimitInfo, RateLimitResult};
