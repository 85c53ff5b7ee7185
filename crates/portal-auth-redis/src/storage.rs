// Token cache store — trait + implementations.
//
// Plain `set(key, value, ttl)` / `get` / `delete` over string values. Callers
// rely only on single-key atomicity; there are no multi-key transactions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

// ─── CacheStore Trait ────────────────────────────────────────────

/// Key/value store holding token and adapter records.
///
/// Every write carries a TTL; nothing in this store lives forever.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Get a value by key. Returns `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value with a TTL in seconds, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Read and delete a key in one step.
    ///
    /// The default falls back to `get` followed by `delete`; implementations
    /// with an atomic primitive should override it.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }

    /// Drop any cached connection. The next call reconnects.
    async fn close(&self) {}
}

/// Errors from cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the connection dropped mid-call.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
    #[error("Cache store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// ─── In-Memory Implementation ────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory implementation of `CacheStore`.
///
/// Useful for testing and development. Not suitable for production
/// multi-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all expired entries.
    pub async fn cleanup(&self) {
        let mut store = self.store.write().await;
        store.retain(|_, entry| !entry.is_expired());
    }

    /// Get total number of non-expired entries.
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining lifetime of a live key.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let store = self.store.read().await;
        store
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let mut store = self.store.write().await;
        store.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut store = self.store.write().await;
        Ok(store.remove(key).is_some_and(|e| !e.is_expired()))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut store = self.store.write().await;
        Ok(store
            .remove(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value))
    }
}

// ─── Redis-Like Connection Trait ─────────────────────────────────

/// Minimal command surface the Redis store needs.
///
/// `RedisConnection` implements it over the `redis` crate; tests can
/// implement it over anything.
#[async_trait]
pub trait RedisLikeConnection: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<bool, StoreError>;
    /// `GETDEL`: atomic read-and-delete.
    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Forget the cached connection handle.
    async fn reset(&self);
}

/// Redis cache store.
///
/// Wraps a `RedisLikeConnection` and namespaces every key with `prefix`.
#[derive(Debug)]
pub struct RedisCacheStore<C: RedisLikeConnection> {
    conn: C,
    pub prefix: String,
}

impl<C: RedisLikeConnection> RedisCacheStore<C> {
    pub fn new(conn: C) -> Self {
        Self::with_prefix(conn, "portal:")
    }

    pub fn with_prefix(conn: C, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl<C: RedisLikeConnection + 'static> CacheStore for RedisCacheStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn.get(&self.prefixed(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.conn.set_ex(&self.prefixed(key), value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.conn.del(&self.prefixed(key)).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn.get_del(&self.prefixed(key)).await
    }

    async fn close(&self) {
        self.conn.reset().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_set_and_get() {
        let storage = InMemoryCacheStore::new();
        storage.set("key1", "value1", 60).await.unwrap();
        assert_eq!(storage.get("key1").await.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let storage = InMemoryCacheStore::new();
        assert!(storage.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = InMemoryCacheStore::new();
        storage.set("key1", "value1", 60).await.unwrap();
        assert!(storage.delete("key1").await.unwrap());
        assert!(!storage.delete("key1").await.unwrap());
        assert!(storage.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let storage = InMemoryCacheStore::new();
        storage.set("key1", "value1", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(storage.get("key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_ttl() {
        let storage = InMemoryCacheStore::new();
        storage.set("k", "v1", 10).await.unwrap();
        storage.set("k", "v2", 3600).await.unwrap();
        let ttl = storage.ttl("k").await.unwrap();
        assert!(ttl > Duration::from_secs(3500));
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_take_returns_once() {
        let storage = InMemoryCacheStore::new();
        storage.set("k", "v", 60).await.unwrap();
        assert_eq!(storage.take("k").await.unwrap().as_deref(), Some("v"));
        assert!(storage.take("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup() {
        let storage = InMemoryCacheStore::new();
        storage.set("live", "val", 60).await.unwrap();
        storage.set("expired", "val", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        storage.cleanup().await;
        assert_eq!(storage.len().await, 1);
    }

    /// Connection double that records the raw commands it receives.
    #[derive(Debug, Default)]
    struct FakeConnection {
        commands: Mutex<Vec<String>>,
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl RedisLikeConnection for FakeConnection {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.commands.lock().unwrap().push(format!("GET {key}"));
            Ok(self.values.lock().unwrap().get(key).cloned())
        }
        async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
            self.commands
                .lock()
                .unwrap()
                .push(format!("SET {key} EX {ttl_secs}"));
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
        async fn del(&self, key: &str) -> Result<bool, StoreError> {
            self.commands.lock().unwrap().push(format!("DEL {key}"));
            Ok(self.values.lock().unwrap().remove(key).is_some())
        }
        async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.commands.lock().unwrap().push(format!("GETDEL {key}"));
            Ok(self.values.lock().unwrap().remove(key))
        }
        async fn reset(&self) {
            self.commands.lock().unwrap().push("RESET".to_string());
        }
    }

    #[tokio::test]
    async fn test_redis_store_prefixes_and_sets_ttl() {
        let store = RedisCacheStore::with_prefix(FakeConnection::default(), "t:");
        store.set("session:1", "{}", 604_800).await.unwrap();
        assert_eq!(store.get("session:1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.take("session:1").await.unwrap().as_deref(), Some("{}"));
        store.close().await;

        let commands = store.conn.commands.lock().unwrap().clone();
        assert_eq!(
            commands,
            vec![
                "SET t:session:1 EX 604800",
                "GET t:session:1",
                "GETDEL t:session:1",
                "RESET",
            ]
        );
    }
}
