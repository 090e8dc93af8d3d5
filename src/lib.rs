// ============================================================================
// Item Sweeper Library
// ============================================================================

pub mod config;
pub mod core;
pub mod engine;
pub mod facade;
pub mod policy;
pub mod storage;
pub mod world;

// Re-export main types for convenience
pub use config::{CleanupPolicy, DeletionBudget, PolicyHandle, RawSettings};
pub use core::{ObjectId, PartitionId, Position, Result, SweepError, TrackedObject};
pub use engine::{CycleMode, CycleOutcome, CycleReport, Scheduler};
pub use facade::{CleanupEngine, EngineRemote, EngineStats, PartitionStats};
pub use storage::{FilePersistence, MemoryPersistence, Persistence, SaveWorker, TrackingRegistry};
pub use world::{Broadcaster, NoopBroadcaster, ObjectStore};
