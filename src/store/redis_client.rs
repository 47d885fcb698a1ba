//! Redis implementation of [`RemoteClient`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tracing::info;

use super::{RemoteClient, StoreError};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend {
                store: "redis",
                message: err.to_string(),
            }
        }
    }
}

/// Redis connection with automatic reconnection.
#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
}

impl RedisClient {
    /// Connect to `url`, e.g. `redis://127.0.0.1:6379/0` or `rediss://...`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("Connected to redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl RemoteClient for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: u64, ttl_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("PSETEX")
            .arg(key)
            .arg(ttl_ms)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        u64::try_from(value).map_err(|_| StoreError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    async fn expire(&self, key: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
