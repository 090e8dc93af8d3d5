//! One cleanup sweep over one partition.
//!
//! The sweep is split in two halves: [`plan`] is a pure function that
//! ranks eligible objects and sizes the deletion budget, and [`run_cycle`]
//! wraps it with tracking updates, deletions and persistence. Dry runs
//! call the same `plan`, so a preview always matches what an applying
//! cycle would have done against the same store.

use super::budget::{self, BudgetDecision};
use super::report::{CycleMode, CycleOutcome, CycleReport, VerdictCounts};
use crate::config::CleanupPolicy;
use crate::core::{Aabb, ObjectId, PartitionId, Position};
use crate::policy::{EligibilityPolicy, Verdict};
use crate::storage::{TrackingRegistry, TrackingStore};
use crate::world::{Broadcaster, ObjectStore, ScanScope};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, info, warn};

pub const BLOCKS_PER_CHUNK: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: ObjectId,
    pub first_seen_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePlan {
    /// Eligible objects, oldest first, ties broken by id.
    pub ranked: Vec<Candidate>,
    pub verdicts: VerdictCounts,
    pub budget: BudgetDecision,
    /// Message of the first host panic hit while evaluating objects.
    pub first_failure: Option<String>,
}

/// Everything a cycle borrows from its owner for the duration of one sweep.
pub struct CycleContext<'a, W: ObjectStore + ?Sized> {
    pub world: &'a mut W,
    pub registry: &'a mut TrackingRegistry,
    pub policy: &'a CleanupPolicy,
    pub broadcaster: &'a dyn Broadcaster,
}

/// Regions to enumerate: one full-height column per anchor, sized from
/// the host view distance, or the whole partition.
pub fn scan_scope<W: ObjectStore + ?Sized>(
    world: &W,
    policy: &CleanupPolicy,
    anchors: &[Position],
) -> ScanScope {
    if !policy.scan_near_anchors_only || anchors.is_empty() {
        return ScanScope::Whole;
    }
    let chunks = world
        .view_distance_chunks()
        .unwrap_or(policy.fallback_view_distance_chunks)
        .max(2);
    let half_width = f64::from(chunks) * BLOCKS_PER_CHUNK + BLOCKS_PER_CHUNK;
    ScanScope::Regions(
        anchors
            .iter()
            .map(|anchor| Aabb::column(*anchor, half_width))
            .collect(),
    )
}

/// Live objects of the partition, de-duplicated in enumeration order.
pub fn gather_snapshot<W: ObjectStore + ?Sized>(
    world: &W,
    policy: &CleanupPolicy,
    partition: &PartitionId,
    anchors: &[Position],
) -> Vec<ObjectId> {
    let scope = scan_scope(world, policy, anchors);
    let mut seen = HashSet::new();
    world
        .enumerate(partition, &scope)
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Ranks the snapshot and computes the deletion budget. Objects without a
/// tracking record are treated as first seen at `now_ms`. A host lookup
/// that panics marks only that object as failed.
pub fn plan<W: ObjectStore + ?Sized>(
    world: &W,
    store: &TrackingStore,
    policy: &CleanupPolicy,
    anchors: &[Aabb],
    snapshot: &[ObjectId],
    now_ms: u64,
) -> CyclePlan {
    let rules = EligibilityPolicy::new(policy, world, anchors);
    let mut verdicts = VerdictCounts::default();
    let mut ranked = Vec::new();
    let mut first_failure = None;

    for &id in snapshot {
        let first_seen_ms = store.get(id).map_or(now_ms, |r| r.first_seen_ms);
        let verdict = if now_ms.saturating_sub(first_seen_ms) < policy.min_item_age_ms {
            Verdict::TooYoung
        } else {
            let evaluated = catch_unwind(AssertUnwindSafe(|| match rules.classification_key(id) {
                Some(key) => rules.evaluate(id, &key),
                None => Verdict::Unclassified,
            }));
            evaluated.unwrap_or_else(|payload| {
                first_failure.get_or_insert_with(|| {
                    format!("evaluation of {} panicked: {}", id, panic_message(payload.as_ref()))
                });
                Verdict::Failed
            })
        };
        verdicts.record(verdict);
        if verdict == Verdict::Eligible {
            ranked.push(Candidate { id, first_seen_ms });
        }
    }

    ranked.sort_by_key(|c| (c.first_seen_ms, c.id));
    let budget = budget::compute(
        policy.budget,
        ranked.len(),
        snapshot.len(),
        policy.entity_count_threshold,
    );

    CyclePlan {
        ranked,
        verdicts,
        budget,
        first_failure,
    }
}

fn warn_failures(report: &CycleReport, first_failure: Option<&str>) {
    if report.failed == 0 && report.verdicts.failed == 0 {
        return;
    }
    warn!(
        partition = %report.partition,
        failed_deletions = report.failed,
        failed_evaluations = report.verdicts.failed,
        first_error = first_failure.unwrap_or_default(),
        "object operations failed during cleanup cycle"
    );
}

pub fn run_cycle<W: ObjectStore + ?Sized>(
    ctx: CycleContext<'_, W>,
    partition: &PartitionId,
    now_ms: u64,
    mode: CycleMode,
) -> CycleReport {
    let CycleContext {
        world,
        registry,
        policy,
        broadcaster,
    } = ctx;

    let anchors = world.anchors(partition);
    let snapshot = gather_snapshot(&*world, policy, partition, &anchors);
    let mut report = CycleReport::new(
        partition.clone(),
        mode,
        now_ms,
        snapshot.len(),
        policy.entity_count_threshold,
        policy.min_item_age_ms,
        policy.budget,
    );

    // Age bookkeeping only accrues while the partition is congested.
    if snapshot.len() <= policy.entity_count_threshold {
        report.outcome = CycleOutcome::BelowThreshold;
        return report;
    }

    let store = match registry.store_mut(partition) {
        Ok(store) => store,
        Err(err) => {
            warn!(partition = %partition, error = %err, "tracking store unavailable, skipping cycle");
            report.outcome = CycleOutcome::StoreUnavailable;
            return report;
        }
    };

    let mut first_failure: Option<String> = None;
    if mode == CycleMode::Apply {
        for &id in &snapshot {
            let observed = catch_unwind(AssertUnwindSafe(|| {
                world
                    .position(id)
                    .map(|position| (position, world.classification_key(id)))
            }));
            match observed {
                Ok(Some((position, key))) => store.observe(id, position, key, now_ms),
                Ok(None) => {}
                Err(payload) => {
                    first_failure.get_or_insert_with(|| {
                        format!("lookup of {} panicked: {}", id, panic_message(payload.as_ref()))
                    });
                }
            }
        }
    }

    let anchor_bounds = world.anchor_bounds(partition);
    let plan = plan(&*world, store, policy, &anchor_bounds, &snapshot, now_ms);
    report.verdicts = plan.verdicts;
    report.budget = plan.budget;
    if let Some(message) = plan.first_failure {
        first_failure.get_or_insert(message);
    }

    if mode == CycleMode::DryRun {
        warn_failures(&report, first_failure.as_deref());
        debug!(partition = %partition, would_delete = plan.budget.to_delete, "dry run planned");
        return report;
    }

    for candidate in &plan.ranked {
        if report.deleted >= plan.budget.to_delete {
            break;
        }
        // Liveness is re-checked here: the snapshot may be stale by now.
        let removed = catch_unwind(AssertUnwindSafe(|| {
            if world.is_alive(candidate.id) {
                world.delete(candidate.id)
            } else {
                Ok(false)
            }
        }));
        match removed {
            Ok(Ok(true)) => {
                report.deleted += 1;
                store.remove(candidate.id);
            }
            Ok(Ok(false)) => {
                report.vanished += 1;
                if policy.prune_missing_records && store.remove(candidate.id).is_some() {
                    report.pruned += 1;
                }
            }
            Ok(Err(err)) => {
                report.failed += 1;
                first_failure.get_or_insert_with(|| err.to_string());
            }
            Err(payload) => {
                report.failed += 1;
                first_failure.get_or_insert_with(|| {
                    format!("deletion of {} panicked: {}", candidate.id, panic_message(payload.as_ref()))
                });
            }
        }
    }

    warn_failures(&report, first_failure.as_deref());

    if policy.prune_missing_records {
        let observed: HashSet<ObjectId> = snapshot.iter().copied().collect();
        // A panicking liveness check keeps the record.
        let stale: Vec<ObjectId> = store
            .all()
            .filter(|r| {
                !observed.contains(&r.id)
                    && catch_unwind(AssertUnwindSafe(|| !world.is_alive(r.id))).unwrap_or(false)
            })
            .map(|r| r.id)
            .collect();
        for id in stale {
            store.remove(id);
            report.pruned += 1;
        }
    }

    if report.deleted > 0 || report.pruned > 0 {
        report.persisted = registry.persist(partition);
    }

    if report.deleted > 0 {
        info!(
            partition = %partition,
            deleted = report.deleted,
            eligible = report.eligible(),
            total = report.total,
            threshold = report.threshold,
            min_age_ms = report.min_age_ms,
            budget = %report.strategy,
            excess = report.budget.excess,
            "cleanup cycle removed objects"
        );
        // No user-facing notice when nobody is around to read it.
        if !anchors.is_empty() {
            broadcaster.broadcast(partition, &report.to_string());
        }
    }

    report
}
