pub mod persistence;
pub mod registry;
pub mod tracking;
pub mod worker;

pub use persistence::{FilePersistence, MemoryPersistence, Persistence, TrackingSnapshot};
pub use registry::TrackingRegistry;
pub use tracking::TrackingStore;
pub use worker::{SaveOutcome, SaveRequest, SaveWorker};
