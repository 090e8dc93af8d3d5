//! Boundary to the host simulation that owns the live objects.
//!
//! The engine never holds on to live object handles. Everything is looked
//! up by [`ObjectId`] at the moment it is needed and liveness is re-checked
//! right before any mutation.

pub mod memory;

pub use memory::{SimulatedObject, SimulatedWorld};

use crate::core::{Aabb, ObjectId, PartitionId, Position, Result};

/// Which part of a partition to enumerate.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanScope {
    Whole,
    /// Only objects inside at least one of the regions.
    Regions(Vec<Aabb>),
}

impl ScanScope {
    pub fn includes(&self, position: &Position) -> bool {
        match self {
            Self::Whole => true,
            Self::Regions(regions) => regions.iter().any(|r| r.contains(position)),
        }
    }
}

/// Authoritative store of live world objects.
pub trait ObjectStore {
    /// Partitions currently loaded by the host.
    fn partitions(&self) -> Vec<PartitionId>;

    /// Live objects of `partition` within `scope`. May contain duplicates
    /// when a host answers regions independently.
    fn enumerate(&self, partition: &PartitionId, scope: &ScanScope) -> Vec<ObjectId>;

    /// Positions of the anchors (players) present in `partition`.
    fn anchors(&self, partition: &PartitionId) -> Vec<Position>;

    /// Bounding boxes of the anchors in `partition`, used for proximity
    /// protection. Defaults to a point per anchor.
    fn anchor_bounds(&self, partition: &PartitionId) -> Vec<Aabb> {
        self.anchors(partition).into_iter().map(Aabb::point).collect()
    }

    fn position(&self, id: ObjectId) -> Option<Position>;

    fn bounds(&self, id: ObjectId) -> Option<Aabb> {
        self.position(id).map(Aabb::point)
    }

    fn is_alive(&self, id: ObjectId) -> bool;

    /// Removes the object. `Ok(false)` when it was already gone.
    fn delete(&mut self, id: ObjectId) -> Result<bool>;

    fn has_custom_name(&self, id: ObjectId) -> bool;

    /// Stable key for the object's kind, `None` once the object is gone.
    fn classification_key(&self, id: ObjectId) -> Option<String>;

    fn belongs_to_group(&self, id: ObjectId, group: &str) -> bool;

    /// Host view distance in chunks, if the host exposes one.
    fn view_distance_chunks(&self) -> Option<u32> {
        None
    }
}

/// User-facing notice channel, separate from the log.
pub trait Broadcaster {
    fn broadcast(&self, partition: &PartitionId, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn broadcast(&self, _partition: &PartitionId, _message: &str) {}
}
