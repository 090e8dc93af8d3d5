use super::{ObjectStore, ScanScope};
use crate::core::{Aabb, ObjectId, PartitionId, Position, Result, SweepError};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Half-extent of a dropped item's hitbox.
const ITEM_HALF_EXTENT: f64 = 0.125;
const PLAYER_HALF_WIDTH: f64 = 0.3;
const PLAYER_HEIGHT: f64 = 1.8;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedObject {
    pub partition: PartitionId,
    pub position: Position,
    pub kind: String,
    pub custom_name: Option<String>,
    pub groups: BTreeSet<String>,
}

impl SimulatedObject {
    pub fn new(partition: impl Into<PartitionId>, kind: impl Into<String>, position: Position) -> Self {
        Self {
            partition: partition.into(),
            position,
            kind: kind.into(),
            custom_name: None,
            groups: BTreeSet::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }
}

/// In-memory object store. Ids are handed out sequentially, so
/// enumeration order is spawn order and runs are reproducible.
#[derive(Debug, Default)]
pub struct SimulatedWorld {
    partitions: BTreeSet<PartitionId>,
    objects: BTreeMap<ObjectId, SimulatedObject>,
    anchors: BTreeMap<PartitionId, Vec<Position>>,
    view_distance_chunks: Option<u32>,
    failing_deletes: HashSet<ObjectId>,
    next_seq: u128,
}

impl SimulatedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_partition(&mut self, partition: impl Into<PartitionId>) {
        self.partitions.insert(partition.into());
    }

    pub fn spawn(&mut self, object: SimulatedObject) -> ObjectId {
        self.next_seq += 1;
        let id = ObjectId::from_u128(self.next_seq);
        self.partitions.insert(object.partition.clone());
        self.objects.insert(id, object);
        id
    }

    pub fn spawn_item(
        &mut self,
        partition: impl Into<PartitionId>,
        kind: impl Into<String>,
        position: Position,
    ) -> ObjectId {
        self.spawn(SimulatedObject::new(partition, kind, position))
    }

    /// Removes an object behind the engine's back (despawn, pickup, unload).
    pub fn despawn(&mut self, id: ObjectId) -> bool {
        self.objects.remove(&id).is_some()
    }

    pub fn add_anchor(&mut self, partition: impl Into<PartitionId>, at: Position) {
        let partition = partition.into();
        self.partitions.insert(partition.clone());
        self.anchors.entry(partition).or_default().push(at);
    }

    pub fn clear_anchors(&mut self, partition: &PartitionId) {
        self.anchors.remove(partition);
    }

    pub fn set_view_distance_chunks(&mut self, chunks: Option<u32>) {
        self.view_distance_chunks = chunks;
    }

    /// Makes every later `delete` of `id` fail with a world error.
    pub fn fail_deletes_for(&mut self, id: ObjectId) {
        self.failing_deletes.insert(id);
    }

    pub fn object(&self, id: ObjectId) -> Option<&SimulatedObject> {
        self.objects.get(&id)
    }

    pub fn count(&self, partition: &PartitionId) -> usize {
        self.objects
            .values()
            .filter(|o| &o.partition == partition)
            .count()
    }

    pub fn ids_in(&self, partition: &PartitionId) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| &o.partition == partition)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl ObjectStore for SimulatedWorld {
    fn partitions(&self) -> Vec<PartitionId> {
        self.partitions.iter().cloned().collect()
    }

    fn enumerate(&self, partition: &PartitionId, scope: &ScanScope) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| &o.partition == partition && scope.includes(&o.position))
            .map(|(id, _)| *id)
            .collect()
    }

    fn anchors(&self, partition: &PartitionId) -> Vec<Position> {
        self.anchors.get(partition).cloned().unwrap_or_default()
    }

    /// Player-sized boxes standing on each anchor position.
    fn anchor_bounds(&self, partition: &PartitionId) -> Vec<Aabb> {
        self.anchors(partition)
            .into_iter()
            .map(|at| {
                Aabb::new(
                    Position::new(at.x - PLAYER_HALF_WIDTH, at.y, at.z - PLAYER_HALF_WIDTH),
                    Position::new(at.x + PLAYER_HALF_WIDTH, at.y + PLAYER_HEIGHT, at.z + PLAYER_HALF_WIDTH),
                )
            })
            .collect()
    }

    fn position(&self, id: ObjectId) -> Option<Position> {
        self.objects.get(&id).map(|o| o.position)
    }

    fn bounds(&self, id: ObjectId) -> Option<Aabb> {
        self.objects
            .get(&id)
            .map(|o| Aabb::around(o.position, ITEM_HALF_EXTENT))
    }

    fn is_alive(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    fn delete(&mut self, id: ObjectId) -> Result<bool> {
        if self.failing_deletes.contains(&id) {
            return Err(SweepError::WorldError(format!("object {} refused removal", id)));
        }
        Ok(self.objects.remove(&id).is_some())
    }

    fn has_custom_name(&self, id: ObjectId) -> bool {
        self.objects
            .get(&id)
            .is_some_and(|o| o.custom_name.is_some())
    }

    fn classification_key(&self, id: ObjectId) -> Option<String> {
        self.objects.get(&id).map(|o| o.kind.clone())
    }

    fn belongs_to_group(&self, id: ObjectId, group: &str) -> bool {
        self.objects
            .get(&id)
            .is_some_and(|o| o.groups.contains(group))
    }

    fn view_distance_chunks(&self) -> Option<u32> {
        self.view_distance_chunks
    }
}
