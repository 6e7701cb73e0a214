//! Durable key/value storage.
//!
//! Storage is per origin and shared by every tab of that origin. Reads are
//! synchronous; a write made through one tab's handle is announced to the
//! handles of every *other* tab so they can reconcile their caches.

use crate::error::Result;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::broadcast;

pub mod memory;

pub use memory::MemoryStorage;

/// Identifies the tab a storage handle belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(pub u64);

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// A key was written or removed by the tab identified by `origin`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub origin: Origin,
}

/// Trait for durable storage implementations.
///
/// All methods use `&self`; implementations use interior mutability so one
/// handle can be shared by every repository of a tab.
pub trait Storage: Send + Sync + Clone + 'static {
    /// The tab this handle writes on behalf of.
    fn origin(&self) -> Origin;

    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    /// Returns `Err` if the storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`.
    ///
    /// # Errors
    /// Returns `Err` if the storage rejects the write.
    fn set(&self, key: &str, value: String) -> Result<()>;

    /// Remove `key` entirely.
    ///
    /// # Errors
    /// Returns `Err` if the storage rejects the removal.
    fn remove(&self, key: &str) -> Result<()>;

    /// Subscribe to writes made by other tabs.
    fn subscribe(&self) -> StorageSubscription;

    /// Check whether `key` holds a value.
    ///
    /// # Errors
    /// Returns `Err` if the storage cannot be read.
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Keys changed by other tabs since the last drain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    keys: BTreeSet<String>,
    overflowed: bool,
}

impl ChangeSet {
    /// A change set that touches every key.
    ///
    /// Used when notifications were dropped and the exact keys are unknown.
    pub fn everything() -> Self {
        ChangeSet {
            keys: BTreeSet::new(),
            overflowed: true,
        }
    }

    pub fn insert(&mut self, key: String) {
        self.keys.insert(key);
    }

    /// True if `key` may have changed.
    pub fn touches(&self, key: &str) -> bool {
        self.overflowed || self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        !self.overflowed && self.keys.is_empty()
    }
}

/// Receiving end of storage change notifications for one handle.
///
/// Events emitted by the subscribing tab itself are filtered out.
#[derive(Debug)]
pub struct StorageSubscription {
    receiver: broadcast::Receiver<StorageEvent>,
    origin: Origin,
}

impl StorageSubscription {
    pub fn new(receiver: broadcast::Receiver<StorageEvent>, origin: Origin) -> Self {
        StorageSubscription { receiver, origin }
    }

    /// Collect every pending foreign change without waiting.
    pub fn drain(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();

        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.origin != self.origin => changes.insert(event.key),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "Storage subscription for {} lagged by {} events",
                        self.origin, skipped
                    );
                    changes = ChangeSet::everything();
                }
                Err(_) => break,
            }
        }

        changes
    }

    /// Wait for the next foreign change.
    ///
    /// Returns `None` once every storage handle has been dropped.
    pub async fn next(&mut self) -> Option<ChangeSet> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.origin != self.origin => {
                    let mut changes = ChangeSet::default();
                    changes.insert(event.key);
                    return Some(changes);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some(ChangeSet::everything())
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
