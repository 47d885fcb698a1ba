//! Counter store backed by a remote key-value service.

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{CounterStore, StoreError};

/// Key namespace used when none is given.
pub const DEFAULT_REMOTE_PREFIX: &str = "ratelimit";

/// The primitives a remote key-value service must offer.
///
/// `incr` must be atomic on the service side. TTLs are in milliseconds.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl_ms`.
    async fn set_with_ttl(&self, key: &str, value: u64, ttl_ms: u64) -> Result<(), StoreError>;

    /// Atomically increment `key` (creating it at zero) and return the result.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Set the time-to-live of an existing key.
    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<(), StoreError>;

    /// Delete `key`.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// A [`CounterStore`] over a [`RemoteClient`].
///
/// The expiry is installed only when an increment creates the key (returns 1),
/// so later increments in the same window do not push the reset further out.
/// The increment and the expiry are two separate calls.
#[derive(Debug, Clone)]
pub struct RemoteStore<C> {
    client: C,
    prefix: String,
}

impl<C: RemoteClient> RemoteStore<C> {
    /// Create a store using the default key prefix.
    pub fn new(client: C) -> Self {
        Self::with_prefix(client, DEFAULT_REMOTE_PREFIX)
    }

    /// Create a store namespacing keys as `"{prefix}:{key}"`.
    pub fn with_prefix(client: C, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl<C: RemoteClient> CounterStore for RemoteStore<C> {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let full_key = self.full_key(key);
        match self.client.get(&full_key).await? {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| StoreError::InvalidValue {
                    key: full_key,
                    value: raw,
                }),
        }
    }

    async fn set(&self, key: &str, value: u64, ttl_ms: u64) -> Result<(), StoreError> {
        let full_key = self.full_key(key);
        if ttl_ms == 0 {
            return self.client.delete(&full_key).await;
        }
        self.client.set_with_ttl(&full_key, value, ttl_ms).await
    }

    async fn increment(&self, key: &str, ttl_ms: u64) -> Result<u64, StoreError> {
        let full_key = self.full_key(key);
        let value = self.client.incr(&full_key).await?;
        trace!(key = %full_key, value, "Incremented remote counter");

        if ttl_ms == 0 {
            self.client.delete(&full_key).await?;
        } else if value == 1 {
            debug!(key = %full_key, ttl_ms, "Installing expiry on new remote counter");
            self.client.expire(&full_key, ttl_ms).await?;
        }

        Ok(value)
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    /// Remote service double that records every call.
    #[derive(Default)]
    struct FakeClient {
        values: Mutex<HashMap<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteClient for FakeClient {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.calls.lock().push(format!("GET {}", key));
            Ok(self.values.lock().get(key).cloned())
        }

        async fn set_with_ttl(&self, key: &str, value: u64, ttl_ms: u64) -> Result<(), StoreError> {
            self.calls.lock().push(format!("PSETEX {} {} {}", key, ttl_ms, value));
            self.values.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn incr(&self, key: &str) -> Result<u64, StoreError> {
            self.calls.lock().push(format!("INCR {}", key));
            let mut values = self.values.lock();
            let next = values
                .get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
                + 1;
            values.insert(key.to_string(), next.to_string());
            Ok(next)
        }

        async fn expire(&self, key: &str, ttl_ms: u64) -> Result<(), StoreError> {
            self.calls.lock().push(format!("PEXPIRE {} {}", key, ttl_ms));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.calls.lock().push(format!("DEL {}", key));
            self.values.lock().remove(key);
            Ok(())
        }
    }

    struct DownClient;

    #[async_trait]
    impl RemoteClient for DownClient {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: u64, _ttl_ms: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn incr(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn expire(&self, _key: &str, _ttl_ms: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_expiry_installed_only_on_first_increment() {
        let store = RemoteStore::new(FakeClient::default());

        assert_eq!(store.increment("user", 60_000).await.unwrap(), 1);
        assert_eq!(store.increment("user", 60_000).await.unwrap(), 2);
        assert_eq!(store.increment("user", 60_000).await.unwrap(), 3);

        assert_eq!(
            store.client().calls(),
            vec![
                "INCR ratelimit:user",
                "PEXPIRE ratelimit:user 60000",
                "INCR ratelimit:user",
                "INCR ratelimit:user",
            ]
        );
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let store = RemoteStore::with_prefix(FakeClient::default(), "api");

        store.set("token", 4, 1_000).await.unwrap();
        assert_eq!(store.get("token").await.unwrap(), Some(4));
        assert_eq!(store.client().calls()[0], "PSETEX api:token 1000 4");
    }

    #[tokio::test]
    async fn test_zero_ttl_set_deletes() {
        let store = RemoteStore::new(FakeClient::default());

        store.increment("k", 1_000).await.unwrap();
        store.set("k", 0, 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_an_error() {
        let client = FakeClient::default();
        client
            .values
            .lock()
            .insert("ratelimit:k".to_string(), "abc".to_string());
        let store = RemoteStore::new(client);

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_backend_failures_propagate() {
        let store = RemoteStore::new(DownClient);

        assert_err!(store.increment("k", 1_000).await);
        assert_err!(store.get("k").await);
        assert_ok!(RemoteStore::new(FakeClient::default()).set("k", 1, 10).await);
    }
}
