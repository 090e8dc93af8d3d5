pub mod error;
pub mod types;

pub use error::{Result, SweepError};
pub use types::{Aabb, ObjectId, PartitionId, Position, TrackedObject};
