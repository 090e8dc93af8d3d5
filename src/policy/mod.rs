//! Eligibility and protection rules.
//!
//! Everything here is a pure function of the baked policy and what the
//! object store reports right now. Protection is checked before list
//! matching, so the safety rules win in both filter modes.

use crate::config::{CleanupPolicy, FilterEntry, FilterMode};
use crate::core::{Aabb, ObjectId};
use crate::world::ObjectStore;

/// Why an object was or was not considered for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Eligible,
    TooYoung,
    ProtectedByName,
    ProtectedByProximity,
    /// Rejected by the allow/deny list.
    Filtered,
    /// The store could not classify the object (usually: it is gone).
    Unclassified,
    /// A host lookup panicked while the object was being evaluated.
    Failed,
}

pub struct EligibilityPolicy<'a, W: ObjectStore + ?Sized> {
    policy: &'a CleanupPolicy,
    world: &'a W,
    anchors: &'a [Aabb],
}

impl<'a, W: ObjectStore + ?Sized> EligibilityPolicy<'a, W> {
    /// `anchors` are the anchor bounding boxes of the partition being evaluated.
    pub fn new(policy: &'a CleanupPolicy, world: &'a W, anchors: &'a [Aabb]) -> Self {
        Self {
            policy,
            world,
            anchors,
        }
    }

    pub fn is_protected_by_name(&self, id: ObjectId) -> bool {
        self.policy.protect_named_items && self.world.has_custom_name(id)
    }

    pub fn is_protected_by_proximity(&self, id: ObjectId) -> bool {
        let radius = self.policy.player_safe_radius;
        if radius == 0 || self.anchors.is_empty() {
            return false;
        }
        let Some(bounds) = self.world.bounds(id) else {
            return false;
        };
        let zone = bounds.inflate(f64::from(radius));
        self.anchors.iter().any(|anchor| zone.intersects(anchor))
    }

    pub fn classification_key(&self, id: ObjectId) -> Option<String> {
        self.world.classification_key(id)
    }

    pub fn matches_filter_list(&self, id: ObjectId, key: &str) -> bool {
        self.policy.filter.iter().any(|entry| match entry {
            FilterEntry::Exact(listed) => listed == key,
            FilterEntry::Group(group) => self.world.belongs_to_group(id, group),
        })
    }

    pub fn is_eligible_for_deletion(&self, id: ObjectId, key: &str) -> bool {
        self.evaluate(id, key) == Verdict::Eligible
    }

    /// Full verdict for an object that already passed the age gate.
    pub fn evaluate(&self, id: ObjectId, key: &str) -> Verdict {
        if self.is_protected_by_name(id) {
            return Verdict::ProtectedByName;
        }
        if self.is_protected_by_proximity(id) {
            return Verdict::ProtectedByProximity;
        }
        let listed = self.matches_filter_list(id, key);
        let deletable = match self.policy.filter_mode {
            FilterMode::Denylist => !listed,
            FilterMode::Allowlist => listed,
        };
        if deletable {
            Verdict::Eligible
        } else {
            Verdict::Filtered
        }
    }
}
