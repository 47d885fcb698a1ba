//! Core rate limiter implementation.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::key::ScopedKey;
use super::result::{Metadata, RateLimitConfig, RateLimitInfo, RateLimitResult};
use crate::duration::parse_duration;
use crate::error::{QuotagateError, Result};
use crate::store::CounterStore;
use crate::strategy::{StrategyRegistry, FIXED_WINDOW};

/// Callback invoked with the result of a check.
pub type Hook = Arc<dyn Fn(&RateLimitResult) + Send + Sync>;

/// Configuration for a rate limiter.
#[derive(Clone)]
pub struct RateLimiterOptions {
    /// Maximum requests allowed per window
    pub limit: u64,
    /// Window length, e.g. `"30s"`
    pub duration: String,
    /// Name of the strategy in the limiter's registry
    pub strategy: String,
    /// Reserved headroom, reported in result metadata
    pub burst: u64,
    /// Namespace for stored counters
    pub prefix: String,
    /// Extra fields merged into every result
    pub metadata: Metadata,
    /// Called after a denied check
    pub on_limit: Option<Hook>,
    /// Called after an allowed check
    pub on_success: Option<Hook>,
}

impl RateLimiterOptions {
    /// Options for `limit` requests per `duration` using the fixed window
    /// strategy.
    pub fn new(limit: u64, duration: impl Into<String>) -> Self {
        Self {
            limit,
            duration: duration.into(),
            strategy: FIXED_WINDOW.to_string(),
            burst: 0,
            prefix: String::new(),
            metadata: Metadata::new(),
            on_limit: None,
            on_success: None,
        }
    }

    pub fn strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = name.into();
        self
    }

    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Namespace for stored counters. Must not contain `:`; checks with such
    /// a prefix fail with [`QuotagateError::InvalidPrefix`].
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn on_limit(mut self, hook: impl Fn(&RateLimitResult) + Send + Sync + 'static) -> Self {
        self.on_limit = Some(Arc::new(hook));
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&RateLimitResult) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    fn config_for(&self, key: &str) -> RateLimitConfig {
        RateLimitConfig {
            key: key.to_string(),
            limit: self.limit,
            duration: self.duration.clone(),
            strategy: self.strategy.clone(),
            burst: self.burst,
            prefix: self.prefix.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl std::fmt::Debug for RateLimiterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterOptions")
            .field("limit", &self.limit)
            .field("duration", &self.duration)
            .field("strategy", &self.strategy)
            .field("burst", &self.burst)
            .field("prefix", &self.prefix)
            .field("metadata", &self.metadata)
            .field("on_limit", &self.on_limit.is_some())
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

/// Decides whether operations for a key may proceed.
///
/// A limiter binds one counter store, one strategy registry and one set of
/// options. The store is the only shared mutable state; limiters derived with
/// the `with_*` methods share it unless it is the part being replaced.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    registry: Arc<StrategyRegistry>,
    options: RateLimiterOptions,
}

impl RateLimiter {
    /// Create a rate limiter with the built-in strategies.
    pub fn new(store: Arc<dyn CounterStore>, options: RateLimiterOptions) -> Self {
        Self::from_parts(store, Arc::new(StrategyRegistry::new()), options)
    }

    /// Create a rate limiter with an explicit strategy registry.
    pub fn from_parts(
        store: Arc<dyn CounterStore>,
        registry: Arc<StrategyRegistry>,
        options: RateLimiterOptions,
    ) -> Self {
        Self {
            store,
            registry,
            options,
        }
    }

    /// Count one request against `key` and decide whether it may proceed.
    ///
    /// The increment happens even when the request is denied; a denial is
    /// followed by a best-effort read-then-decrement that is not atomic with
    /// the increment, so concurrent denials can leave the counter off by a
    /// small amount.
    pub async fn check(&self, key: &str) -> Result<RateLimitResult> {
        let ttl_ms = parse_duration(&self.options.duration)?;
        if ttl_ms == 0 {
            return Err(QuotagateError::EmptyWindow {
                duration: self.options.duration.clone(),
            });
        }
        let strategy = self.registry.get(&self.options.strategy)?;
        let scoped = ScopedKey::new(&self.options.prefix, key)?;
        let store_key = scoped.to_store_key();

        trace!(
            key = %scoped,
            strategy = %self.options.strategy,
            limit = self.options.limit,
            "Checking rate limit"
        );

        let current = self.store.increment(&store_key, ttl_ms).await?;
        let result = strategy.check(current, &self.options.config_for(key))?;

        if result.allowed {
            if let Some(hook) = &self.options.on_success {
                hook(&result);
            }
        } else {
            debug!(
                key = %scoped,
                count = current,
                limit = self.options.limit,
                "Rate limit exceeded"
            );
            self.compensate(&store_key, ttl_ms).await?;
            if let Some(hook) = &self.options.on_limit {
                hook(&result);
            }
        }

        Ok(result)
    }

    /// Take back the increment of a denied request.
    async fn compensate(&self, store_key: &str, ttl_ms: u64) -> Result<()> {
        let stored = self.store.get(store_key).await?.unwrap_or(0);
        if stored > 0 {
            self.store.set(store_key, stored - 1, ttl_ms).await?;
            debug!(key = %store_key, value = stored - 1, "Compensated denied request");
        }
        Ok(())
    }

    /// Check and report only whether the request was allowed.
    pub async fn is_allowed(&self, key: &str) -> Result<bool> {
        Ok(self.check(key).await?.allowed)
    }

    /// Check and report only the remaining quota.
    pub async fn remaining(&self, key: &str) -> Result<u64> {
        Ok(self.check(key).await?.remaining)
    }

    /// Check and report only the reset time.
    pub async fn reset_time(&self, key: &str) -> Result<u64> {
        Ok(self.check(key).await?.reset_time)
    }

    /// Check and report the headline fields.
    pub async fn info(&self, key: &str) -> Result<RateLimitInfo> {
        let result = self.check(key).await?;
        Ok(RateLimitInfo::from(&result))
    }

    /// The counter value for `key` without counting a request.
    pub async fn current_count(&self, key: &str) -> Result<u64> {
        let store_key = ScopedKey::new(&self.options.prefix, key)?.to_store_key();
        Ok(self.store.get(&store_key).await?.unwrap_or(0))
    }

    /// A limiter using `store` and this limiter's options and strategies.
    pub fn with_store(&self, store: Arc<dyn CounterStore>) -> Self {
        Self::from_parts(store, self.registry.clone(), self.options.clone())
    }

    /// A limiter with a copy of these options modified by `update`.
    pub fn with_options(&self, update: impl FnOnce(&mut RateLimiterOptions)) -> Self {
        let mut options = self.options.clone();
        update(&mut options);
        Self::from_parts(self.store.clone(), self.registry.clone(), options)
    }

    /// A limiter using a different strategy.
    pub fn with_strategy(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.with_options(|options| options.strategy = name)
    }

    /// A limiter resolving strategies from `registry`.
    pub fn with_registry(&self, registry: Arc<StrategyRegistry>) -> Self {
        Self::from_parts(self.store.clone(), registry, self.options.clone())
    }

    /// Modify this limiter's options in place.
    ///
    /// Requires exclusive access; a limiter shared behind an `Arc` must be
    /// rebuilt with [`RateLimiter::with_options`] instead.
    pub fn update_options(&mut self, update: impl FnOnce(&mut RateLimiterOptions)) {
        update(&mut self.options);
    }

    pub fn options(&self) -> &RateLimiterOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.backend_name())
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish()
    }
}
