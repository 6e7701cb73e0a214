//! In-memory storage (default, thread-safe).
//!
//! Uses DashMap for the shared key/value data and a broadcast channel to
//! announce writes to the other tabs of the same origin.

use super::{Origin, Storage, StorageEvent, StorageSubscription};
use crate::error::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

fn next_origin() -> Origin {
    Origin(NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed))
}

/// Thread-safe in-memory storage shared between simulated tabs.
///
/// Cloning a handle keeps the same origin (same tab). Use
/// [`open_tab`](MemoryStorage::open_tab) to get a handle for another tab
/// that sees the same data and receives this tab's change notifications.
///
/// # Example
///
/// ```
/// use skyport::storage::{MemoryStorage, Storage};
///
/// # fn main() -> skyport::Result<()> {
/// let first = MemoryStorage::new();
/// let second = first.open_tab();
/// let mut changes = second.subscribe();
///
/// first.set("cart", "{}".to_string())?;
///
/// assert_eq!(second.get("cart")?, Some("{}".to_string()));
/// assert!(changes.drain().touches("cart"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    store: Arc<DashMap<String, String>>,
    changes: broadcast::Sender<StorageEvent>,
    origin: Origin,
}

impl MemoryStorage {
    /// Create empty storage with a single tab.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MemoryStorage {
            store: Arc::new(DashMap::new()),
            changes,
            origin: next_origin(),
        }
    }

    /// Open another tab onto the same storage.
    pub fn open_tab(&self) -> Self {
        MemoryStorage {
            store: Arc::clone(&self.store),
            changes: self.changes.clone(),
            origin: next_origin(),
        }
    }

    /// Get the current number of keys.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if storage is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get size statistics.
    pub fn stats(&self) -> StorageStats {
        let total_bytes: usize = self
            .store
            .iter()
            .map(|entry| entry.key().len() + entry.value().len())
            .sum();

        StorageStats {
            total_keys: self.store.len(),
            total_bytes,
        }
    }

    /// Print storage statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Storage Stats: {} keys, {} bytes",
            stats.total_keys, stats.total_bytes
        );
    }

    fn announce(&self, key: &str) {
        let event = StorageEvent {
            key: key.to_string(),
            origin: self.origin,
        };
        // No subscribers yet is fine: nobody needs to reconcile.
        let _ = self.changes.send(event);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn origin(&self) -> Origin {
        self.origin
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.store.get(key).map(|entry| entry.value().clone());
        debug!(
            "Storage GET {} ({}) -> {}",
            key,
            self.origin,
            if value.is_some() { "HIT" } else { "MISS" }
        );
        Ok(value)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        debug!("Storage SET {} ({}, {} bytes)", key, self.origin, value.len());
        self.store.insert(key.to_string(), value);
        self.announce(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.store.remove(key).is_some() {
            debug!("Storage REMOVE {} ({})", key, self.origin);
            self.announce(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription::new(self.changes.subscribe(), self.origin)
    }
}

/// Storage statistics.
#[derive(Clone, Debug)]
pub struct StorageStats {
    pub total_keys: usize,
    pub total_bytes: usize,
}
