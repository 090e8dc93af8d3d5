use super::persistence::Persistence;
use super::tracking::TrackingStore;
use super::worker::{SaveRequest, SaveWorker};
use crate::core::{PartitionId, Result};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns the tracking store of every partition the engine has touched.
///
/// Stores are loaded lazily on first access, or eagerly through
/// [`TrackingRegistry::warm`]. Saves are performed inline or handed to a
/// [`SaveWorker`], depending on how the registry was built.
pub struct TrackingRegistry {
    persistence: Arc<dyn Persistence>,
    worker: Option<SaveWorker>,
    stores: HashMap<PartitionId, TrackingStore>,
    /// Unloaded stores whose background save has not been confirmed yet.
    unloading: HashMap<PartitionId, TrackingStore>,
    /// Background saves submitted and not yet reported, per partition.
    in_flight: HashMap<PartitionId, usize>,
    save_failures: u64,
}

impl TrackingRegistry {
    /// Registry that saves synchronously on the calling thread.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence,
            worker: None,
            stores: HashMap::new(),
            unloading: HashMap::new(),
            in_flight: HashMap::new(),
            save_failures: 0,
        }
    }

    /// Registry that hands saves to a background worker.
    pub fn with_worker(persistence: Arc<dyn Persistence>, worker: SaveWorker) -> Self {
        Self {
            worker: Some(worker),
            ..Self::new(persistence)
        }
    }

    pub fn is_loaded(&self, partition: &PartitionId) -> bool {
        self.stores.contains_key(partition)
    }

    /// Loads the partition's store now so the first cycle does no I/O.
    pub fn warm(&mut self, partition: &PartitionId) -> Result<()> {
        self.store_mut(partition).map(|_| ())
    }

    pub fn store(&self, partition: &PartitionId) -> Option<&TrackingStore> {
        self.stores.get(partition)
    }

    /// The partition's store, loading it on first access. A store still
    /// waiting on its unload save is taken back as is. A failed load leaves
    /// the partition unloaded so the next access retries.
    pub fn store_mut(&mut self, partition: &PartitionId) -> Result<&mut TrackingStore> {
        match self.stores.entry(partition.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                if let Some(store) = self.unloading.remove(partition) {
                    debug!(partition = %partition, "tracking store reclaimed before its unload save settled");
                    return Ok(entry.insert(store));
                }
                let records = self.persistence.load(partition)?;
                debug!(partition = %partition, records = records.len(), "tracking store loaded");
                Ok(entry.insert(TrackingStore::from_records(partition.clone(), records)))
            }
        }
    }

    pub fn loaded(&self) -> impl Iterator<Item = &TrackingStore> {
        self.stores.values()
    }

    /// Number of unloaded stores still held for an unconfirmed save.
    pub fn pending_unloads(&self) -> usize {
        self.unloading.len()
    }

    /// Persists the partition's store if it is dirty. Returns whether a save
    /// was performed or queued. Failures are logged and leave the store
    /// dirty, so a later call retries.
    pub fn persist(&mut self, partition: &PartitionId) -> bool {
        if !self.stores.get(partition).is_some_and(TrackingStore::is_dirty) {
            return false;
        }
        let Some(mut store) = self.stores.remove(partition) else {
            return false;
        };
        let saved = self.save(&mut store);
        self.stores.insert(partition.clone(), store);
        saved
    }

    fn save(&mut self, store: &mut TrackingStore) -> bool {
        let partition = store.partition().clone();
        let records = store.export();

        let result = match &self.worker {
            Some(worker) => worker
                .submit(SaveRequest {
                    partition: partition.clone(),
                    records,
                })
                .map(|()| {
                    *self.in_flight.entry(partition.clone()).or_default() += 1;
                }),
            None => self.persistence.save(&partition, &records),
        };

        match result {
            Ok(()) => {
                store.mark_clean();
                true
            }
            Err(err) => {
                self.save_failures += 1;
                warn!(partition = %partition, error = %err, "failed to persist tracking store");
                false
            }
        }
    }

    /// Applies outcomes reported by the background worker: a partition
    /// whose save failed is marked dirty again, and unloaded stores are
    /// resubmitted or released once their save is confirmed.
    pub fn reconcile_saves(&mut self) {
        let outcomes = match self.worker.as_mut() {
            Some(worker) => worker.drain_outcomes(),
            None => return,
        };
        for outcome in outcomes {
            if let Entry::Occupied(mut pending) = self.in_flight.entry(outcome.partition.clone()) {
                *pending.get_mut() -= 1;
                if *pending.get() == 0 {
                    pending.remove();
                }
            }
            if outcome.error.is_some() {
                self.save_failures += 1;
                let store = match self.stores.get_mut(&outcome.partition) {
                    Some(store) => Some(store),
                    None => self.unloading.get_mut(&outcome.partition),
                };
                if let Some(store) = store {
                    store.mark_dirty();
                }
            }
        }
        self.settle_unloads();
    }

    fn settle_unloads(&mut self) {
        let partitions: Vec<PartitionId> = self.unloading.keys().cloned().collect();
        for partition in partitions {
            let Some(mut store) = self.unloading.remove(&partition) else {
                continue;
            };
            if store.is_dirty() {
                self.save(&mut store);
            }
            if store.is_dirty() || self.in_flight.contains_key(&partition) {
                self.unloading.insert(partition, store);
            } else {
                debug!(partition = %partition, "unloaded tracking store released");
            }
        }
    }

    /// Persists every dirty store. Returns how many were saved or queued.
    pub fn flush_all(&mut self) -> usize {
        self.reconcile_saves();
        let partitions: Vec<PartitionId> = self.stores.keys().cloned().collect();
        partitions.iter().filter(|p| self.persist(p)).count()
    }

    /// Flushes and releases the partition's store. Returns whether it was
    /// released. A store whose save failed stays loaded, and one whose
    /// background save is still pending is held until the worker reports.
    pub fn unload(&mut self, partition: &PartitionId) -> bool {
        let Some(mut store) = self.stores.remove(partition) else {
            return false;
        };
        if store.is_dirty() {
            self.save(&mut store);
        }
        if store.is_dirty() {
            warn!(partition = %partition, "tracking store kept loaded after a failed save");
            self.stores.insert(partition.clone(), store);
            return false;
        }
        if self.in_flight.contains_key(partition) {
            self.unloading.insert(partition.clone(), store);
        }
        true
    }

    pub fn save_failures(&self) -> u64 {
        self.save_failures
    }

    /// Detaches the background worker so the caller can await its shutdown.
    pub fn take_worker(&mut self) -> Option<SaveWorker> {
        self.worker.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectId, Position, TrackedObject};
    use crate::storage::persistence::MemoryPersistence;

    fn overworld() -> PartitionId {
        PartitionId::from("overworld")
    }

    #[test]
    fn test_lazy_load_from_persistence() {
        let record = TrackedObject::first_observed(
            ObjectId::from_u128(1),
            overworld(),
            Position::default(),
            "minecraft:dirt",
            42,
        );
        let persistence = Arc::new(MemoryPersistence::with_records(overworld(), vec![record]));
        let mut registry = TrackingRegistry::new(persistence);

        assert!(!registry.is_loaded(&overworld()));
        let store = registry.store_mut(&overworld()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.is_dirty());
        assert!(registry.is_loaded(&overworld()));
    }

    #[test]
    fn test_persist_only_when_dirty() {
        let persistence = Arc::new(MemoryPersistence::new());
        let mut registry = TrackingRegistry::new(persistence.clone());
        registry.warm(&overworld()).unwrap();

        assert!(!registry.persist(&overworld()));
        registry
            .store_mut(&overworld())
            .unwrap()
            .observe(ObjectId::from_u128(3), Position::default(), None, 0);
        assert!(registry.persist(&overworld()));
        assert!(!registry.store(&overworld()).unwrap().is_dirty());
        assert_eq!(persistence.save_count(), 1);
    }

    #[test]
    fn test_failed_inline_save_stays_dirty() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.set_fail_saves(true);
        let mut registry = TrackingRegistry::new(persistence.clone());

        registry
            .store_mut(&overworld())
            .unwrap()
            .observe(ObjectId::from_u128(3), Position::default(), None, 0);
        assert!(!registry.persist(&overworld()));
        assert!(registry.store(&overworld()).unwrap().is_dirty());
        assert_eq!(registry.save_failures(), 1);

        persistence.set_fail_saves(false);
        assert_eq!(registry.flush_all(), 1);
        assert_eq!(persistence.saved(&overworld()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_failure_marks_dirty_again() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.set_fail_saves(true);
        let worker = SaveWorker::spawn(persistence.clone(), &tokio::runtime::Handle::current());
        let mut registry = TrackingRegistry::with_worker(persistence.clone(), worker);

        registry
            .store_mut(&overworld())
            .unwrap()
            .observe(ObjectId::from_u128(5), Position::default(), None, 0);
        assert!(registry.persist(&overworld()));
        assert!(!registry.store(&overworld()).unwrap().is_dirty());

        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            registry.reconcile_saves();
            if registry.save_failures() > 0 {
                break;
            }
        }
        assert_eq!(registry.save_failures(), 1);
        assert!(registry.store(&overworld()).unwrap().is_dirty());

        persistence.set_fail_saves(false);
        assert_eq!(registry.flush_all(), 1);
        let outcomes = registry.take_worker().unwrap().shutdown().await.unwrap();
        assert!(outcomes.iter().all(|o| o.error.is_none()));
        assert_eq!(persistence.saved(&overworld()).unwrap().len(), 1);
    }

    #[test]
    fn test_unload_keeps_store_when_inline_save_fails() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.set_fail_saves(true);
        let mut registry = TrackingRegistry::new(persistence.clone());

        registry
            .store_mut(&overworld())
            .unwrap()
            .observe(ObjectId::from_u128(8), Position::default(), None, 0);
        assert!(!registry.unload(&overworld()));
        assert!(registry.is_loaded(&overworld()));
        assert!(registry.store(&overworld()).unwrap().is_dirty());

        persistence.set_fail_saves(false);
        assert!(registry.unload(&overworld()));
        assert!(!registry.is_loaded(&overworld()));

        let store = registry.store_mut(&overworld()).unwrap();
        assert!(store.get(ObjectId::from_u128(8)).is_some());
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_unloaded_store_held_until_background_save_succeeds() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.set_fail_saves(true);
        let worker = SaveWorker::spawn(persistence.clone(), &tokio::runtime::Handle::current());
        let mut registry = TrackingRegistry::with_worker(persistence.clone(), worker);

        registry
            .store_mut(&overworld())
            .unwrap()
            .observe(ObjectId::from_u128(9), Position::default(), None, 0);
        assert!(registry.unload(&overworld()));
        assert!(!registry.is_loaded(&overworld()));
        assert_eq!(registry.pending_unloads(), 1);

        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            registry.reconcile_saves();
            if registry.save_failures() > 0 {
                break;
            }
        }
        assert!(registry.save_failures() > 0);
        assert_eq!(registry.pending_unloads(), 1);

        persistence.set_fail_saves(false);
        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            registry.reconcile_saves();
            if registry.pending_unloads() == 0 {
                break;
            }
        }
        assert_eq!(registry.pending_unloads(), 0);
        assert_eq!(persistence.saved(&overworld()).unwrap().len(), 1);

        let store = registry.store_mut(&overworld()).unwrap();
        assert!(store.get(ObjectId::from_u128(9)).is_some());
        registry.take_worker().unwrap().shutdown().await.unwrap();
    }
}
