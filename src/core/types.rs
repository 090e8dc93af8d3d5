use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a world object. Survives across cycles while the
/// object exists; never reused for a different object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ObjectId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an independently simulated world/region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PartitionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Axis-aligned bounding box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Position,
    pub max: Position,
}

impl Aabb {
    pub fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// Degenerate box at a single point.
    pub fn point(at: Position) -> Self {
        Self { min: at, max: at }
    }

    pub fn around(center: Position, half_extent: f64) -> Self {
        Self::point(center).inflate(half_extent)
    }

    /// Square column around `center` spanning the whole vertical range.
    pub fn column(center: Position, half_width: f64) -> Self {
        Self {
            min: Position::new(center.x - half_width, f64::NEG_INFINITY, center.z - half_width),
            max: Position::new(center.x + half_width, f64::INFINITY, center.z + half_width),
        }
    }

    pub fn inflate(&self, amount: f64) -> Self {
        Self {
            min: Position::new(self.min.x - amount, self.min.y - amount, self.min.z - amount),
            max: Position::new(self.max.x + amount, self.max.y + amount, self.max.z + amount),
        }
    }

    /// Boxes touching on a face count as intersecting.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Persisted age-tracking record for one live object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: ObjectId,
    pub partition: PartitionId,
    /// Last observed position. Diagnostics only.
    pub position: Position,
    pub classification_key: String,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
}

impl TrackedObject {
    pub fn first_observed(
        id: ObjectId,
        partition: PartitionId,
        position: Position,
        classification_key: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            partition,
            position,
            classification_key: classification_key.into(),
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
        }
    }

    /// Returns the record refreshed by a later observation. `first_seen_ms`
    /// is preserved and `last_seen_ms` never drops below it.
    pub fn observed_again(
        &self,
        position: Position,
        classification_key: Option<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: self.id,
            partition: self.partition.clone(),
            position,
            classification_key: classification_key
                .unwrap_or_else(|| self.classification_key.clone()),
            first_seen_ms: self.first_seen_ms,
            last_seen_ms: now_ms.max(self.first_seen_ms),
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.first_seen_ms)
    }
}
