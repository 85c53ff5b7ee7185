// Cache store doubles.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use portal_auth_redis::{CacheStore, InMemoryCacheStore, StoreError};

/// One `set` call as the store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub key: String,
    pub value: String,
    pub ttl_secs: u64,
}

/// In-memory store that also records every write.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryCacheStore,
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    /// All writes so far, oldest first.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Writes whose key starts with `prefix`.
    pub fn writes_to(&self, prefix: &str) -> Vec<RecordedWrite> {
        self.writes()
            .into_iter()
            .filter(|w| w.key.starts_with(prefix))
            .collect()
    }

    pub fn clear_writes(&self) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.clear();
        }
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(RecordedWrite {
                key: key.to_string(),
                value: value.to_string(),
                ttl_secs,
            });
        }
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.take(key).await
    }
}

/// Store that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineStore;

impl OfflineStore {
    fn unavailable() -> StoreError {
        StoreError::Unavailable("connection refused".into())
    }
}

#[async_trait]
impl CacheStore for OfflineStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(Self::unavailable())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(Self::unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(Self::unavailable())
    }
}
