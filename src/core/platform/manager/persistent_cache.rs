/*
Persistent Cache

Durable snapshot of a principal's notification list, so a restarted console shows the last
known state before its first poll completes.

Entries are keyed by a digest of the principal identity: two admins signing in on the same
device never see each other's notifications. An entry is fresh for a fixed validity window;
past it, the engine treats the start as cold and uses the stale entry only to carry read flags
forward.

Writes are fire and forget. The first storage failure switches the cache to memory-only for
the rest of the session and is logged, never returned.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::application::ports::output::cache_storage_port::{CacheStoragePort, StorageError};
use crate::application::ports::output::clock_port::Clock;
use crate::core::platform::container::notification::{CacheEnvelope, NotificationRecord};

/// How long a saved envelope stays fresh
pub const CACHE_VALIDITY_WINDOW: Duration = Duration::from_secs(5 * 60);

const KEY_PREFIX: &str = "gymdesk.notifications.";

/// Storage key for a principal's cache entry.
pub fn principal_key(principal: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(principal.as_bytes()));
    format!("{}{}", KEY_PREFIX, &digest[..32])
}

/// Envelope read back from storage together with its freshness
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    pub envelope: CacheEnvelope,
    pub fresh: bool,
}

pub struct PersistentCache {
    storage: Arc<dyn CacheStoragePort>,
    clock: Arc<dyn Clock>,
    validity: Duration,
    memory_only: AtomicBool,
}

impl PersistentCache {
    pub fn new(storage: Arc<dyn CacheStoragePort>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            validity: CACHE_VALIDITY_WINDOW,
            memory_only: AtomicBool::new(false),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// True once a storage failure degraded the session to memory only.
    pub fn is_memory_only(&self) -> bool {
        self.memory_only.load(Ordering::Acquire)
    }

    /// Envelope stamped with the current instant.
    pub fn snapshot(&self, notifications: Vec<NotificationRecord>) -> CacheEnvelope {
        CacheEnvelope::new(notifications, self.clock.now())
    }

    /// Persist `envelope` under `key`. Returns whether the write reached storage.
    pub async fn save(&self, key: &str, envelope: &CacheEnvelope) -> bool {
        if self.is_memory_only() {
            return false;
        }

        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize notification cache");
                return false;
            }
        };

        match self.storage.set(key, payload).await {
            Ok(()) => {
                debug!(key, count = envelope.notifications.len(), "Notification cache saved");
                true
            }
            Err(e) => {
                self.degrade(key, &e);
                false
            }
        }
    }

    /// Fresh envelope for `key`, `None` when absent, unreadable or stale.
    pub async fn load(&self, key: &str) -> Option<CacheEnvelope> {
        self.load_any(key)
            .await
            .filter(|snapshot| snapshot.fresh)
            .map(|snapshot| snapshot.envelope)
    }

    /// Envelope for `key` regardless of age.
    pub async fn load_any(&self, key: &str) -> Option<CachedSnapshot> {
        let payload = match self.storage.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                self.degrade(key, &e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEnvelope>(&payload) {
            Ok(envelope) => {
                let fresh = envelope.is_fresh_at(self.clock.now(), self.validity);
                Some(CachedSnapshot { envelope, fresh })
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable notification cache entry");
                None
            }
        }
    }

    /// Remove the entry for `key`, e.g. on sign-out.
    pub async fn clear(&self, key: &str) {
        if let Err(e) = self.storage.remove(key).await {
            warn!(key, error = %e, "Failed to clear notification cache");
        }
    }

    fn degrade(&self, key: &str, error: &StorageError) {
        if !self.memory_only.swap(true, Ordering::AcqRel) {
            warn!(key, error = %error, "Notification cache unavailable, continuing in memory only");
        }
    }
}
