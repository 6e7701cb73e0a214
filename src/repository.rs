//! Generic repository engine.
//!
//! A [`Repository`] owns one storage partition: an in-memory cache mirrored
//! 1:1 with a JSON blob under the entity's storage key, plus an event bus for
//! lifecycle notifications. Concrete repositories wrap one and implement
//! [`LocalRepository`] to supply seeding and any extra validation.
//!
//! # Write path
//!
//! ```text
//! add_item(item)
//!   ├─ validate_add (entity rules + id not taken)
//!   ├─ encode cache + item, write the whole partition to storage
//!   ├─ insert into cache
//!   └─ emit Add (listeners run synchronously, after locks are released)
//! ```
//!
//! Reads never touch storage. Storage is only read back on initialization
//! and when another tab changes the partition (see [`LocalRepository::reconcile`]).

use crate::config::StoreConfig;
use crate::entity::{allocate_id, Entity, EntityId};
use crate::error::{Error, Result};
use crate::events::{EventBus, ListenerId, RepositoryEvent, RepositoryEventKind};
use crate::serialization::{decode_partition, encode_partition};
use crate::storage::{ChangeSet, Storage, StorageSubscription};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Cache, storage partition and event bus of one entity type.
pub struct Repository<M: Entity, S: Storage> {
    storage: S,
    cache: DashMap<EntityId, M>,
    events: EventBus<RepositoryEvent<M>>,
    initialized: AtomicBool,
    subscription: Mutex<Option<StorageSubscription>>,
    // Serializes validate + write + cache insert.
    write_lock: Mutex<()>,
}

impl<M: Entity, S: Storage> Repository<M, S> {
    pub fn new(storage: S) -> Self {
        Repository {
            storage,
            cache: DashMap::new(),
            events: EventBus::new(),
            initialized: AtomicBool::new(false),
            subscription: Mutex::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Storage key of the partition.
    pub fn key(&self) -> &'static str {
        M::storage_key()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Fail with `Error::NotInitialized` until `initialize()` has completed.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized(format!(
                "the {} repository has not been initialized",
                self.key()
            )))
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_item(&self, id: EntityId) -> Option<M> {
        self.cache.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.cache.contains_key(&id)
    }

    pub fn number_of_items(&self) -> usize {
        self.cache.len()
    }

    /// Every cached item, ordered by id.
    pub fn all_items(&self) -> Vec<M> {
        self.snapshot().into_values().collect()
    }

    /// First item (by id) matching `predicate`.
    pub fn find<P>(&self, predicate: P) -> Option<M>
    where
        P: Fn(&M) -> bool,
    {
        self.all_items().into_iter().find(|item| predicate(item))
    }

    /// Items matching `predicate`, ordered by id.
    pub fn filter<P>(&self, predicate: P) -> Vec<M>
    where
        P: Fn(&M) -> bool,
    {
        self.all_items()
            .into_iter()
            .filter(|item| predicate(item))
            .collect()
    }

    /// Copy of the whole cache.
    pub fn snapshot(&self) -> BTreeMap<EntityId, M> {
        self.cache
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Draw a fresh id not present in the cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotInitialized` before `initialize()` has completed,
    /// since the cache cannot be trusted to hold every taken id yet.
    pub fn allocate_id(&self) -> Result<EntityId> {
        self.allocate_id_excluding(&HashSet::new())
    }

    /// Draw a fresh id not present in the cache nor in `reserved`.
    ///
    /// Used when several entities are created in one batch.
    pub fn allocate_id_excluding(&self, reserved: &HashSet<EntityId>) -> Result<EntityId> {
        self.ensure_initialized()?;
        Ok(self.next_free_id(reserved))
    }

    fn next_free_id(&self, reserved: &HashSet<EntityId>) -> EntityId {
        allocate_id(&mut rand::rng(), |candidate| {
            reserved.contains(&candidate) || self.cache.contains_key(&candidate)
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Base add-time check: the entity's own rules and an unused id.
    pub fn validate_add(&self, item: &M) -> Result<()> {
        item.validate()?;
        if self.contains(item.id()) {
            return Err(Error::ValidationError(format!(
                "{} item with id {} already exists",
                self.key(),
                item.id()
            )));
        }
        Ok(())
    }

    /// Add a new item, persist the partition, then emit `Add`.
    ///
    /// # Errors
    ///
    /// - `Error::NotInitialized` before `initialize()` completes
    /// - `Error::ValidationError` if the item is invalid or its id is taken
    /// - `Error::StorageError` / `Error::SerializationError` if persisting fails
    ///
    /// On error nothing is changed.
    pub fn add_item(&self, item: M) -> Result<M> {
        self.ensure_initialized()?;
        let mut added = self.insert_all(vec![item])?;
        added.pop().ok_or_else(|| {
            Error::StorageError(format!("{} add produced no item", self.key()))
        })
    }

    /// Add several new items with a single storage write.
    ///
    /// Either every item is added or none is.
    pub fn add_items(&self, items: Vec<M>) -> Result<Vec<M>> {
        self.ensure_initialized()?;
        self.insert_all(items)
    }

    /// Replace an existing item, persist the partition, then emit `Update`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no item has this id.
    pub fn update_item(&self, item: M) -> Result<M> {
        self.ensure_initialized()?;
        item.validate()?;

        {
            let _guard = self.write_lock.lock();
            if !self.contains(item.id()) {
                return Err(Error::NotFound(format!(
                    "{} item with id {}",
                    self.key(),
                    item.id()
                )));
            }

            let mut next = self.snapshot();
            next.insert(item.id(), item.clone());
            self.write_partition(&next)?;
            self.cache.insert(item.id(), item.clone());
        }

        debug!("Updated {} item {}", self.key(), item.id());
        self.events.emit(&RepositoryEvent::Update(item.clone()));
        Ok(item)
    }

    fn insert_all(&self, items: Vec<M>) -> Result<Vec<M>> {
        if items.is_empty() {
            return Ok(items);
        }

        {
            let _guard = self.write_lock.lock();

            let mut batch = HashSet::new();
            for item in &items {
                self.validate_add(item)?;
                if !batch.insert(item.id()) {
                    return Err(Error::ValidationError(format!(
                        "{} id {} appears twice in one batch",
                        self.key(),
                        item.id()
                    )));
                }
            }

            let mut next = self.snapshot();
            for item in &items {
                next.insert(item.id(), item.clone());
            }
            self.write_partition(&next)?;

            for item in &items {
                self.cache.insert(item.id(), item.clone());
            }
        }

        for item in &items {
            debug!("Added {} item {}", self.key(), item.id());
            self.events.emit(&RepositoryEvent::Add(item.clone()));
        }
        Ok(items)
    }

    /// Put back a previously taken [`snapshot`](Self::snapshot), in cache and storage.
    ///
    /// Emits `Reload`.
    pub fn restore(&self, snapshot: BTreeMap<EntityId, M>) -> Result<()> {
        {
            let _guard = self.write_lock.lock();
            self.write_partition(&snapshot)?;
            self.replace_cache(snapshot);
        }
        info!("Restored {} from snapshot", self.key());
        self.events.emit(&RepositoryEvent::Reload);
        Ok(())
    }

    fn write_partition(&self, items: &BTreeMap<EntityId, M>) -> Result<()> {
        let raw = encode_partition(items)?;
        self.storage.set(self.key(), raw)
    }

    fn replace_cache(&self, items: BTreeMap<EntityId, M>) {
        self.cache.clear();
        for (id, item) in items {
            self.cache.insert(id, item);
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Replace the cache with the stored partition.
    ///
    /// A missing key loads as an empty partition. Returns the number of items.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorruptedData` if any record fails to parse; the cache
    /// is left untouched in that case.
    pub fn load(&self) -> Result<usize> {
        let items = match self.storage.get(self.key())? {
            Some(raw) => decode_partition::<M>(&raw)?,
            None => BTreeMap::new(),
        };
        let count = items.len();
        self.replace_cache(items);
        debug!("Loaded {} {} items from storage", count, self.key());
        Ok(count)
    }

    /// [`load`](Self::load), then emit `Reload`.
    pub fn reload(&self) -> Result<usize> {
        let count = self.load()?;
        self.events.emit(&RepositoryEvent::Reload);
        Ok(count)
    }

    /// Drop the partition from storage and empty the cache.
    pub fn wipe(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.storage.remove(self.key())?;
        self.cache.clear();
        Ok(())
    }

    /// Insert seed records with a single storage write.
    ///
    /// Records without an `id` get a fresh one. An empty fixture writes
    /// nothing. Seeding runs during initialization, so it does not require
    /// the repository to be initialized.
    ///
    /// # Errors
    ///
    /// Returns `Error::FixtureError` if a record does not parse or clashes
    /// with an existing id.
    pub fn seed(&self, records: Vec<serde_json::Value>) -> Result<usize> {
        let mut reserved = HashSet::new();
        let mut items = Vec::with_capacity(records.len());

        for record in records {
            let item = self.parse_fixture(record, &reserved)?;
            reserved.insert(item.id());
            items.push(item);
        }

        let count = items.len();
        self.insert_all(items).map_err(|e| {
            Error::FixtureError(format!("seeding {} failed: {}", self.key(), e))
        })?;
        Ok(count)
    }

    fn parse_fixture(
        &self,
        mut record: serde_json::Value,
        reserved: &HashSet<EntityId>,
    ) -> Result<M> {
        let fixture_error =
            |e: Error| Error::FixtureError(format!("{} fixture record: {}", self.key(), e));

        match record.as_object_mut() {
            Some(fields) => {
                if fields.get("id").map_or(true, serde_json::Value::is_null) {
                    let id = self.next_free_id(reserved);
                    fields.insert("id".to_string(), serde_json::Value::from(id));
                }
            }
            None => {
                return Err(fixture_error(Error::DeserializationError(
                    "record is not an object".to_string(),
                )))
            }
        }

        M::parse(record).map_err(fixture_error)
    }

    // ========================================================================
    // Events and change tracking
    // ========================================================================

    /// Register a lifecycle listener.
    ///
    /// An `Initialize` listener registered after initialization fires
    /// immediately, and stays registered.
    pub fn listen<F>(&self, kind: RepositoryEventKind, callback: F) -> ListenerId
    where
        F: Fn(&RepositoryEvent<M>) + Send + Sync + 'static,
    {
        if kind == RepositoryEventKind::Initialize && self.is_initialized() {
            callback(&RepositoryEvent::Initialize);
        }
        self.events.listen(kind, callback)
    }

    pub fn unlisten(&self, id: ListenerId) -> bool {
        self.events.unlisten(id)
    }

    /// Mark initialization as complete and emit `Initialize`.
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
        self.events.emit(&RepositoryEvent::Initialize);
    }

    /// Start listening for changes made by other tabs. Idempotent.
    pub fn attach(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_none() {
            *subscription = Some(self.storage.subscribe());
        }
    }

    /// Keys changed by other tabs since the last call.
    pub fn take_changes(&self) -> ChangeSet {
        self.subscription
            .lock()
            .as_mut()
            .map(StorageSubscription::drain)
            .unwrap_or_default()
    }
}

/// A concrete repository built on a [`Repository`].
///
/// Implementors provide seeding; initialization and cross-tab
/// reconciliation are shared.
#[allow(async_fn_in_trait)]
pub trait LocalRepository<S: Storage>: Send + Sync {
    type Model: Entity;

    fn base(&self) -> &Repository<Self::Model, S>;

    fn config(&self) -> &StoreConfig;

    /// Seed first-run data. Must do nothing if the data is already present.
    async fn add_default_data(&self) -> Result<()>;

    /// Load state kept beside the partition. Runs at the end of initialization.
    fn load_extra(&self) -> Result<()> {
        Ok(())
    }

    /// React to other keys changed by another tab. Runs after the partition
    /// itself has been reconciled.
    fn reconcile_extra(&self, _changes: &ChangeSet) -> Result<()> {
        Ok(())
    }

    /// Load the cache, seed defaults and emit `Initialize`.
    ///
    /// Corrupted stored data is wiped and re-seeded. In development mode the
    /// partition is always wiped first.
    ///
    /// # Errors
    ///
    /// Fails if storage cannot be read or written, or if a fixture cannot
    /// be loaded.
    async fn initialize(&self) -> Result<()> {
        let base = self.base();
        base.attach();

        if self.config().development_mode {
            info!("Development mode: resetting {}", base.key());
            base.wipe()?;
        }

        self.load_or_recover().await?;
        self.load_extra()?;
        base.mark_initialized();

        info!(
            "Initialized {} repository with {} items",
            base.key(),
            base.number_of_items()
        );
        Ok(())
    }

    /// Apply changes made by other tabs since the last call.
    ///
    /// Returns true if anything changed.
    async fn reconcile(&self) -> Result<bool> {
        let base = self.base();
        let changes = base.take_changes();
        if changes.is_empty() {
            return Ok(false);
        }

        if changes.touches(base.key()) {
            debug!("{} changed in another tab, reloading", base.key());
            self.load_or_recover().await?;
            base.events.emit(&RepositoryEvent::Reload);
        }
        self.reconcile_extra(&changes)?;
        Ok(true)
    }

    /// Load the partition; on corruption wipe it, then seed defaults.
    async fn load_or_recover(&self) -> Result<()> {
        let base = self.base();
        if let Err(e) = base.load() {
            if !e.is_corruption() {
                return Err(e);
            }
            error!("Failed to load {}: {}", base.key(), e);
            warn!("Wiping {} and restoring default data", base.key());
            base.wipe()?;
        }
        self.add_default_data().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: EntityId,
        label: String,
    }

    impl Entity for Widget {
        fn id(&self) -> EntityId {
            self.id
        }

        fn storage_key() -> &'static str {
            "widgets"
        }

        fn validate(&self) -> Result<()> {
            if self.label.is_empty() {
                return Err(Error::ValidationError("label is empty".to_string()));
            }
            Ok(())
        }
    }

    fn widget(id: EntityId, label: &str) -> Widget {
        Widget {
            id,
            label: label.to_string(),
        }
    }

    struct WidgetRepository {
        base: Repository<Widget, MemoryStorage>,
        config: StoreConfig,
        seeds: AtomicUsize,
    }

    impl WidgetRepository {
        fn new(storage: MemoryStorage) -> Self {
            WidgetRepository {
                base: Repository::new(storage),
                config: StoreConfig::default(),
                seeds: AtomicUsize::new(0),
            }
        }
    }

    impl LocalRepository<MemoryStorage> for WidgetRepository {
        type Model = Widget;

        fn base(&self) -> &Repository<Widget, MemoryStorage> {
            &self.base
        }

        fn config(&self) -> &StoreConfig {
            &self.config
        }

        async fn add_default_data(&self) -> Result<()> {
            if self.base.number_of_items() > 0 {
                return Ok(());
            }
            self.seeds.fetch_add(1, Ordering::SeqCst);
            self.base.seed(vec![
                serde_json::json!({ "id": 1, "label": "one" }),
                serde_json::json!({ "label": "fresh" }),
            ])?;
            Ok(())
        }
    }

    fn initialized() -> Repository<Widget, MemoryStorage> {
        let repo = Repository::new(MemoryStorage::new());
        repo.mark_initialized();
        repo
    }

    #[test]
    fn test_add_writes_storage_and_cache() {
        let repo = initialized();
        repo.add_item(widget(5, "five")).expect("Failed to add");

        assert_eq!(repo.get_item(5), Some(widget(5, "five")));
        let raw = repo.storage().get("widgets").unwrap().unwrap();
        assert!(raw.contains("\"5\""));
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let repo = initialized();
        repo.add_item(widget(5, "five")).unwrap();

        let result = repo.add_item(widget(5, "other"));
        assert!(matches!(result, Err(Error::ValidationError(_))));
        assert_eq!(repo.get_item(5).unwrap().label, "five");
        assert_eq!(repo.number_of_items(), 1);
    }

    #[test]
    fn test_invalid_item_leaves_storage_untouched() {
        let repo = initialized();
        assert!(repo.add_item(widget(5, "")).is_err());
        assert!(repo.storage().get("widgets").unwrap().is_none());
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let repo = initialized();
        repo.add_item(widget(2, "two")).unwrap();

        let result = repo.add_items(vec![widget(7, "seven"), widget(2, "again")]);
        assert!(result.is_err());
        assert!(!repo.contains(7));

        let result = repo.add_items(vec![widget(8, "a"), widget(8, "b")]);
        assert!(result.is_err());
        assert!(!repo.contains(8));
    }

    #[test]
    fn test_update_requires_existing_item() {
        let repo = initialized();
        let result = repo.update_item(widget(3, "three"));
        assert!(matches!(result, Err(Error::NotFound(_))));

        repo.add_item(widget(3, "three")).unwrap();
        repo.update_item(widget(3, "THREE")).unwrap();
        assert_eq!(repo.get_item(3).unwrap().label, "THREE");
    }

    #[test]
    fn test_writes_require_initialization() {
        let repo: Repository<Widget, MemoryStorage> = Repository::new(MemoryStorage::new());
        assert!(matches!(
            repo.add_item(widget(1, "one")),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(repo.allocate_id(), Err(Error::NotInitialized(_))));
    }

    #[test]
    fn test_events_follow_writes() {
        let repo = initialized();
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        repo.listen(RepositoryEventKind::DataChange, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        repo.add_item(widget(1, "one")).unwrap();
        repo.update_item(widget(1, "uno")).unwrap();
        let _ = repo.add_item(widget(1, "dup"));

        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_late_initialize_listener_fires_immediately() {
        let repo = initialized();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        repo.listen(RepositoryEventKind::Initialize, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_restore_snapshot() {
        let repo = initialized();
        repo.add_item(widget(1, "one")).unwrap();
        let snapshot = repo.snapshot();

        repo.add_item(widget(2, "two")).unwrap();
        repo.restore(snapshot).unwrap();

        assert!(!repo.contains(2));
        repo.load().unwrap();
        assert!(!repo.contains(2));
        assert!(repo.contains(1));
    }

    #[test]
    fn test_allocated_ids_avoid_cache_and_reserved() {
        let repo = initialized();
        repo.add_item(widget(1, "one")).unwrap();

        let mut reserved = HashSet::new();
        for _ in 0..100 {
            let id = repo.allocate_id_excluding(&reserved).unwrap();
            assert!(!repo.contains(id));
            assert!(reserved.insert(id));
        }
    }

    #[tokio::test]
    async fn test_initialize_seeds_once() {
        let storage = MemoryStorage::new();
        let repo = WidgetRepository::new(storage.clone());
        repo.initialize().await.expect("Failed to initialize");
        repo.initialize().await.expect("Failed to initialize again");

        assert_eq!(repo.seeds.load(Ordering::SeqCst), 1);
        assert_eq!(repo.base.number_of_items(), 2);
        assert!(repo.base.find(|w| w.label == "fresh").is_some());

        let reopened = WidgetRepository::new(storage);
        reopened.initialize().await.unwrap();
        assert_eq!(reopened.seeds.load(Ordering::SeqCst), 0);
        assert_eq!(reopened.base.snapshot(), repo.base.snapshot());
    }

    #[tokio::test]
    async fn test_corrupted_partition_is_wiped_and_reseeded() {
        let storage = MemoryStorage::new();
        storage
            .set("widgets", r#"{"9": {"id": 9, "label": ""}}"#.to_string())
            .unwrap();

        let repo = WidgetRepository::new(storage);
        repo.initialize().await.expect("recovery should not fail");

        assert!(!repo.base.contains(9));
        assert_eq!(repo.base.number_of_items(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_reloads_foreign_writes_only() {
        let storage = MemoryStorage::new();
        let first = WidgetRepository::new(storage.clone());
        let second = WidgetRepository::new(storage.open_tab());
        first.initialize().await.unwrap();
        second.initialize().await.unwrap();
        // Drop the notifications produced by seeding.
        first.reconcile().await.unwrap();
        second.reconcile().await.unwrap();

        first.base.add_item(widget(40, "forty")).unwrap();

        assert!(!first.reconcile().await.unwrap());
        assert!(!second.base.contains(40));
        assert!(second.reconcile().await.unwrap());
        assert!(second.base.contains(40));
    }
}
