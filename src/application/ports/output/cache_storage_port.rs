/*
Cache Storage Port

A small string key/value store the persistent notification cache writes through to. It plays
the role browser local storage plays for a web console: durable across restarts, scoped per
device, and allowed to fail (quota exhausted, storage disabled, read-only disk).

Callers must treat every failure as recoverable. The cache built on top of this port degrades
to a memory-only session instead of propagating storage errors.
*/

use async_trait::async_trait;
use thiserror::Error;

/// Result type for cache storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in cache storage operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(String),
}

#[async_trait]
pub trait CacheStoragePort: Send + Sync {
    /// Read the value stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}
