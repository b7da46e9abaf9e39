/*
Memory Cache Storage

In-memory implementation of the cache storage port. Used when persistence is disabled by
configuration, and as the session fallback in tests. An optional byte capacity emulates a
storage quota: a write that would exceed it fails with QuotaExceeded.
*/

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::ports::output::cache_storage_port::{
    CacheStoragePort, StorageError, StorageResult,
};

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
    capacity_bytes: Option<usize>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that refuses writes once keys and values exceed `capacity_bytes`.
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStoragePort for MemoryCacheStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let mut entries = self.entries.write().await;

        if let Some(capacity) = self.capacity_bytes {
            let used: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            if used + key.len() + value.len() > capacity {
                return Err(StorageError::QuotaExceeded);
            }
        }

        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
