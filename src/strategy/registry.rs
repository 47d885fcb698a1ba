//! Name-to-strategy registry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{ApproximatedSlidingWindow, FixedWindow, SlidingWindow, Strategy};
use crate::clock::{system_clock, SharedClock};
use crate::error::{QuotagateError, Result};

/// Strategies available to a rate limiter, looked up by name.
///
/// The registry is an ordinary value owned by whoever builds the limiter;
/// further strategies can be registered at any time.
pub struct StrategyRegistry {
    strategies: DashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// A registry with no strategies.
    pub fn empty() -> Self {
        Self {
            strategies: DashMap::new(),
        }
    }

    /// The three built-in strategies reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// The three built-in strategies reading `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        let registry = Self::empty();
        registry.register(Arc::new(FixedWindow::new(clock.clone())));
        registry.register(Arc::new(SlidingWindow::new(clock.clone())));
        registry.register(Arc::new(ApproximatedSlidingWindow::new(clock)));
        registry
    }

    /// Add a strategy under its own name, returning any strategy it replaced.
    pub fn register(&self, strategy: Arc<dyn Strategy>) -> Option<Arc<dyn Strategy>> {
        let name = strategy.name().to_string();
        debug!(strategy = %name, "Registering rate limit strategy");
        self.strategies.insert(name, strategy)
    }

    /// Look up a strategy by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| QuotagateError::UnknownStrategy {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategies
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
