//! Quotagate - Admission Control
//!
//! This crate decides whether an operation for a caller-supplied key may
//! proceed under a quota and time window. Counters live in a pluggable
//! [`store::CounterStore`] (in-process or networked), and a windowing
//! [`strategy::Strategy`] turns the post-increment count into a decision.

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod ratelimit;
pub mod store;
pub mod strategy;

pub use error::{QuotagateError, Result};
pub use ratelimit::{RateLimitResult, RateLimiter, RateLimiterOptions};
