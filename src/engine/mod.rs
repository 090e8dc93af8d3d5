pub mod budget;
pub mod cycle;
pub mod report;
pub mod scheduler;

pub use budget::BudgetDecision;
pub use cycle::{Candidate, CycleContext, CyclePlan, gather_snapshot, plan, run_cycle, scan_scope};
pub use report::{CycleMode, CycleOutcome, CycleReport, VerdictCounts};
pub use scheduler::{MS_PER_TICK, Scheduler, tick_to_ms};
