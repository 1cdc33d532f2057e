//! Read-through cache for catalog payloads.
//!
//! Production runs against Redis through [`RedisCache`]; tests use
//! [`InMemoryCache`]. Values are stored as JSON strings so the cache
//! never needs to know about domain types.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// How long a cached book payload stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// How long a "nothing there" answer stays cached. Kept short so a
/// book created right after a miss becomes visible quickly.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// A string-keyed cache with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the cached value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Drops a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process cache used by tests and by deployments without Redis.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a live entry exists for `key`. For test assertions.
    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// Redis-backed cache. Every operation is bounded by `op_timeout` so a
/// stalled Redis node cannot wedge request handling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    /// Connects to Redis at `url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            op_timeout: Duration::from_secs(2),
        })
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = tokio::time::timeout(self.op_timeout, conn.get::<_, Option<String>>(key))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "cache get",
            })??;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        tokio::time::timeout(
            self.op_timeout,
            conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()),
        )
        .await
        .map_err(|_| StoreError::Timeout {
            operation: "cache set",
        })??;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        tokio::time::timeout(self.op_timeout, conn.del::<_, ()>(key))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "cache delete",
            })??;
        Ok(())
    }
}
