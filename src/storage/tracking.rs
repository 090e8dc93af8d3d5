use crate::core::{ObjectId, PartitionId, Position, TrackedObject};
use std::collections::HashMap;

/// Age-tracking records of one partition, keyed by object identity.
///
/// The store only answers "how long has this object been around while the
/// partition was congested". It is never consulted for liveness.
#[derive(Debug, Clone)]
pub struct TrackingStore {
    partition: PartitionId,
    records: HashMap<ObjectId, TrackedObject>,
    dirty: bool,
}

impl TrackingStore {
    pub fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            records: HashMap::new(),
            dirty: false,
        }
    }

    pub fn from_records(partition: PartitionId, records: HashMap<ObjectId, TrackedObject>) -> Self {
        Self {
            partition,
            records,
            dirty: false,
        }
    }

    pub fn partition(&self) -> &PartitionId {
        &self.partition
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.records.get(&id)
    }

    /// Inserts or replaces the record for `record.id`. The store only turns
    /// dirty when the stored value actually changes.
    pub fn put_or_update(&mut self, record: TrackedObject) {
        if self.records.get(&record.id) == Some(&record) {
            return;
        }
        self.records.insert(record.id, record);
        self.dirty = true;
    }

    /// Records one observation of a live object: creates the record with a
    /// fresh age baseline, or refreshes position/key/last-seen of an existing one.
    pub fn observe(
        &mut self,
        id: ObjectId,
        position: Position,
        classification_key: Option<String>,
        now_ms: u64,
    ) {
        let record = match self.records.get(&id) {
            Some(existing) => existing.observed_again(position, classification_key, now_ms),
            None => TrackedObject::first_observed(
                id,
                self.partition.clone(),
                position,
                classification_key.unwrap_or_default(),
                now_ms,
            ),
        };
        self.put_or_update(record);
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<TrackedObject> {
        let removed = self.records.remove(&id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn all(&self) -> impl Iterator<Item = &TrackedObject> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn oldest_first_seen_ms(&self) -> Option<u64> {
        self.records.values().map(|r| r.first_seen_ms).min()
    }

    /// Records ordered by id, the shape handed to persistence.
    pub fn export(&self) -> Vec<TrackedObject> {
        let mut records: Vec<TrackedObject> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}
