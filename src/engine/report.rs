use super::budget::BudgetDecision;
use crate::config::DeletionBudget;
use crate::core::PartitionId;
use crate::policy::Verdict;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Apply,
    /// Plan and report without touching the world or the tracking store.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Population at or below the threshold; nothing was tracked.
    BelowThreshold,
    /// The tracking store could not be loaded; retried next cycle.
    StoreUnavailable,
    Completed,
}

/// Per-verdict tallies over the cycle's snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerdictCounts {
    pub eligible: usize,
    pub too_young: usize,
    pub protected_by_name: usize,
    pub protected_by_proximity: usize,
    pub filtered: usize,
    pub unclassified: usize,
    pub failed: usize,
}

impl VerdictCounts {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Eligible => self.eligible += 1,
            Verdict::TooYoung => self.too_young += 1,
            Verdict::ProtectedByName => self.protected_by_name += 1,
            Verdict::ProtectedByProximity => self.protected_by_proximity += 1,
            Verdict::Filtered => self.filtered += 1,
            Verdict::Unclassified => self.unclassified += 1,
            Verdict::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub partition: PartitionId,
    pub mode: CycleMode,
    pub outcome: CycleOutcome,
    pub now_ms: u64,
    pub total: usize,
    pub threshold: usize,
    pub min_age_ms: u64,
    pub strategy: DeletionBudget,
    pub verdicts: VerdictCounts,
    pub budget: BudgetDecision,
    pub deleted: usize,
    /// Ranked candidates found already gone at deletion time.
    pub vanished: usize,
    /// Deletions the store refused or that panicked.
    pub failed: usize,
    /// Stale tracking records dropped by reconciliation.
    pub pruned: usize,
    pub persisted: bool,
}

impl CycleReport {
    pub(crate) fn new(
        partition: PartitionId,
        mode: CycleMode,
        now_ms: u64,
        total: usize,
        threshold: usize,
        min_age_ms: u64,
        strategy: DeletionBudget,
    ) -> Self {
        Self {
            partition,
            mode,
            outcome: CycleOutcome::Completed,
            now_ms,
            total,
            threshold,
            min_age_ms,
            strategy,
            verdicts: VerdictCounts::default(),
            budget: BudgetDecision::default(),
            deleted: 0,
            vanished: 0,
            failed: 0,
            pruned: 0,
            persisted: false,
        }
    }

    pub fn eligible(&self) -> usize {
        self.verdicts.eligible
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.mode {
            CycleMode::Apply => "removed",
            CycleMode::DryRun => "would remove",
        };
        let count = match self.mode {
            CycleMode::Apply => self.deleted,
            CycleMode::DryRun => self.budget.to_delete,
        };
        write!(
            f,
            "Cleanup [{}]: {} {} of {} eligible (total={}, threshold={}, minAge={}ms, {}, excess={})",
            self.partition,
            verb,
            count,
            self.eligible(),
            self.total,
            self.threshold,
            self.min_age_ms,
            self.strategy,
            self.budget.excess
        )
    }
}
