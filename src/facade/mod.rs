pub mod engine;
pub mod remote;

pub use engine::{CleanupEngine, EngineStats, PartitionStats};
pub use remote::{AdminCommand, EngineRemote};
