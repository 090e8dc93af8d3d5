//! Durable storage for per-partition tracking records

use crate::core::{ObjectId, PartitionId, Result, SweepError, TrackedObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::NamedTempFile;

pub const TRACKING_FORMAT_VERSION: u32 = 1;
const TRACKING_FILE_EXTENSION: &str = "tracked";

/// Load/save boundary for tracking stores. Implementations are called from
/// the save worker, so they must be shareable across threads.
pub trait Persistence: Send + Sync {
    fn load(&self, partition: &PartitionId) -> Result<HashMap<ObjectId, TrackedObject>>;

    fn save(&self, partition: &PartitionId, records: &[TrackedObject]) -> Result<()>;
}

// ============================================================================
// Tracking Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub version: u32,
    pub partition: PartitionId,
    pub created_at: DateTime<Utc>,
    pub records: Vec<TrackedObject>,
}

impl TrackingSnapshot {
    pub fn new(partition: PartitionId, records: Vec<TrackedObject>) -> Self {
        Self {
            version: TRACKING_FORMAT_VERSION,
            partition,
            created_at: Utc::now(),
            records,
        }
    }
}

// ============================================================================
// File Persistence
// ============================================================================

/// One MessagePack snapshot file per partition under `root`.
pub struct FilePersistence {
    root: PathBuf,
}

impl FilePersistence {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            SweepError::IoError(format!("Failed to create tracking directory: {}", e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding a partition's snapshot. ASCII letters, digits and `-`
    /// are kept and every other byte is written as `_XX` hex, so distinct
    /// partition ids never share a file.
    pub fn path_for(&self, partition: &PartitionId) -> PathBuf {
        let mut stem = String::with_capacity(partition.as_str().len());
        for byte in partition.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("_{:02X}", byte));
            }
        }
        self.root.join(format!("{}.{}", stem, TRACKING_FILE_EXTENSION))
    }
}

impl Persistence for FilePersistence {
    fn load(&self, partition: &PartitionId) -> Result<HashMap<ObjectId, TrackedObject>> {
        let path = self.path_for(partition);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let data = fs::read(&path)
            .map_err(|e| SweepError::persistence(partition, format!("Failed to read snapshot: {}", e)))?;
        let snapshot: TrackingSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            SweepError::persistence(partition, format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.version != TRACKING_FORMAT_VERSION {
            return Err(SweepError::persistence(
                partition,
                format!("Unsupported snapshot version {}", snapshot.version),
            ));
        }
        if &snapshot.partition != partition {
            return Err(SweepError::persistence(
                partition,
                format!("Snapshot belongs to partition '{}'", snapshot.partition),
            ));
        }
        Ok(snapshot.records.into_iter().map(|r| (r.id, r)).collect())
    }

    fn save(&self, partition: &PartitionId, records: &[TrackedObject]) -> Result<()> {
        let snapshot = TrackingSnapshot::new(partition.clone(), records.to_vec());
        let serialized = rmp_serde::to_vec_named(&snapshot).map_err(|e| {
            SweepError::persistence(partition, format!("Failed to serialize snapshot: {}", e))
        })?;

        let mut temp = NamedTempFile::new_in(&self.root)
            .map_err(|e| SweepError::persistence(partition, format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| SweepError::persistence(partition, format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SweepError::persistence(partition, format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(self.path_for(partition))
            .map_err(|e| SweepError::persistence(partition, format!("Failed to rename snapshot: {}", e.error)))?;
        Ok(())
    }
}

// ============================================================================
// Memory Persistence
// ============================================================================

/// Keeps saved snapshots in memory. Saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<HashMap<PartitionId, Vec<TrackedObject>>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(partition: PartitionId, records: Vec<TrackedObject>) -> Self {
        let persistence = Self::new();
        if let Ok(mut saved) = persistence.saved.lock() {
            saved.insert(partition, records);
        }
        persistence
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn saved(&self, partition: &PartitionId) -> Option<Vec<TrackedObject>> {
        self.saved.lock().ok()?.get(partition).cloned()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, partition: &PartitionId) -> Result<HashMap<ObjectId, TrackedObject>> {
        let saved = self.saved.lock()?;
        Ok(saved
            .get(partition)
            .map(|records| records.iter().map(|r| (r.id, r.clone())).collect())
            .unwrap_or_default())
    }

    fn save(&self, partition: &PartitionId, records: &[TrackedObject]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SweepError::persistence(partition, "injected save failure"));
        }
        self.saved.lock()?.insert(partition.clone(), records.to_vec());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;
    use tempfile::TempDir;

    fn record(seq: u128, partition: &PartitionId, first_seen_ms: u64) -> TrackedObject {
        TrackedObject::first_observed(
            ObjectId::from_u128(seq),
            partition.clone(),
            Position::new(seq as f64, 64.0, 0.0),
            "minecraft:cobblestone",
            first_seen_ms,
        )
    }

    #[test]
    fn test_file_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(temp_dir.path()).unwrap();
        let partition = PartitionId::from("minecraft:overworld");
        let records = vec![record(1, &partition, 100), record(2, &partition, 200)];

        persistence.save(&partition, &records).unwrap();
        assert!(persistence.path_for(&partition).exists());

        let loaded = persistence.load(&partition).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&ObjectId::from_u128(2)], records[1]);
    }

    #[test]
    fn test_similar_partition_ids_use_separate_files() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(temp_dir.path()).unwrap();
        let colon = PartitionId::from("mod:overworld");
        let underscore = PartitionId::from("mod_overworld");

        assert_ne!(persistence.path_for(&colon), persistence.path_for(&underscore));
        assert!(
            persistence
                .path_for(&colon)
                .ends_with(format!("mod_3Aoverworld.{}", TRACKING_FILE_EXTENSION))
        );

        persistence.save(&colon, &[record(1, &colon, 10)]).unwrap();
        persistence
            .save(&underscore, &[record(2, &underscore, 20), record(3, &underscore, 30)])
            .unwrap();

        let loaded = persistence.load(&colon).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&ObjectId::from_u128(1)));
        assert_eq!(persistence.load(&underscore).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(temp_dir.path().join("nested")).unwrap();
        let loaded = persistence.load(&PartitionId::from("the_end")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(temp_dir.path()).unwrap();
        let partition = PartitionId::from("overworld");

        persistence
            .save(&partition, &[record(1, &partition, 1), record(2, &partition, 2)])
            .unwrap();
        persistence.save(&partition, &[record(3, &partition, 3)]).unwrap();

        let loaded = persistence.load(&partition).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&ObjectId::from_u128(3)));
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(temp_dir.path()).unwrap();
        let partition = PartitionId::from("overworld");
        fs::write(persistence.path_for(&partition), b"garbage").unwrap();

        let err = persistence.load(&partition).unwrap_err();
        assert!(matches!(err, SweepError::PersistenceError { .. }));
    }

    #[test]
    fn test_memory_persistence_failure_switch() {
        let persistence = MemoryPersistence::new();
        let partition = PartitionId::from("overworld");

        persistence.set_fail_saves(true);
        assert!(persistence.save(&partition, &[]).is_err());
        assert_eq!(persistence.save_count(), 0);

        persistence.set_fail_saves(false);
        persistence.save(&partition, &[record(1, &partition, 5)]).unwrap();
        assert_eq!(persistence.save_count(), 1);
        assert_eq!(persistence.load(&partition).unwrap().len(), 1);
    }
}
