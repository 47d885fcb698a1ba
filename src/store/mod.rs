//! Counter stores.
//!
//! A store maps string keys to integer counters with a time-to-live. The only
//! hard requirement on an implementation is that `increment` is atomic with
//! respect to other increments of the same key.

mod memory;
mod remote;
#[cfg(feature = "redis")]
mod redis_client;

pub use memory::{EvictionReason, MemoryStore, MemoryStoreOptions, MemoryStoreStats, StoreObserver};
pub use remote::{RemoteClient, RemoteStore, DEFAULT_REMOTE_PREFIX};
#[cfg(feature = "redis")]
pub use redis_client::RedisClient;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::StoreSettings;

/// Errors raised by counter stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} backend failure: {message}")]
    Backend { store: &'static str, message: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Non-numeric counter value {value:?} stored under {key:?}")]
    InvalidValue { key: String, value: String },
    #[error("Unsupported store: {0}")]
    Unsupported(String),
}

/// A counter value together with its absolute expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    /// Current counter value
    pub value: u64,
    /// Expiry in milliseconds since the Unix epoch
    pub expires_at: u64,
}

impl CounterRecord {
    /// Create a record expiring `ttl_ms` after `now`.
    pub fn new(value: u64, now: u64, ttl_ms: u64) -> Self {
        Self {
            value,
            expires_at: now.saturating_add(ttl_ms),
        }
    }

    /// A record is logically absent once `now` reaches its expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Storage contract shared by every backend.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value for `key`, or `None` when absent or expired.
    ///
    /// Reading an expired key removes it.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Install `value` for `key` with `ttl_ms` of remaining life.
    ///
    /// A ttl of zero installs a record that already reads as expired.
    async fn set(&self, key: &str, value: u64, ttl_ms: u64) -> Result<(), StoreError>;

    /// Atomically add one to the live value (absent counts as zero), store it
    /// with a fresh `ttl_ms` and return the new value.
    async fn increment(&self, key: &str, ttl_ms: u64) -> Result<u64, StoreError>;

    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str {
        "custom"
    }
}

/// Build the store described by `settings`.
///
/// This is the only place that knows about concrete backends; everything
/// downstream works with `Arc<dyn CounterStore>`.
pub async fn connect(settings: &StoreSettings) -> Result<Arc<dyn CounterStore>, StoreError> {
    match settings {
        StoreSettings::Memory(memory) => {
            let store = MemoryStore::new(MemoryStoreOptions {
                max_size: memory.max_size,
                cleanup_interval: memory.cleanup_interval(),
                ..Default::default()
            });
            info!(max_size = memory.max_size, "Using in-process counter store");
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis")]
        StoreSettings::Redis { url, prefix } => {
            let client = RedisClient::connect(url).await?;
            info!(prefix = %prefix, "Using redis counter store");
            Ok(Arc::new(RemoteStore::with_prefix(client, prefix.clone())))
        }
        #[cfg(not(feature = "redis"))]
        StoreSettings::Redis { .. } => Err(StoreError::Unsupported(
            "redis backend requires the `redis` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStoreSettings;

    #[test]
    fn test_record_expiry_is_inclusive() {
        let record = CounterRecord::new(1, 1_000, 500);
        assert_eq!(record.expires_at, 1_500);
        assert!(!record.is_expired(1_499));
        assert!(record.is_expired(1_500));
    }

    #[test]
    fn test_zero_ttl_record_is_born_expired() {
        let record = CounterRecord::new(7, 1_000, 0);
        assert!(record.is_expired(1_000));
    }

    #[tokio::test]
    async fn test_connect_memory_store() {
        let settings = StoreSettings::Memory(MemoryStoreSettings {
            max_size: 10,
            cleanup_interval_ms: 0,
        });
        let store = connect(&settings).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.increment("k", 60_000).await.unwrap(), 1);
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_connect_redis_without_feature() {
        let settings = StoreSettings::Redis {
            url: "redis://127.0.0.1:6379".to_string(),
            prefix: DEFAULT_REMOTE_PREFIX.to_string(),
        };
        let err = connect(&settings).await.err().unwrap();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
