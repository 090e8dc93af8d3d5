use crate::config::DeletionBudget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BudgetDecision {
    /// Population above the threshold.
    pub excess: usize,
    /// What the strategy alone would allow.
    pub quota: usize,
    pub to_delete: usize,
}

pub fn compute(budget: DeletionBudget, eligible: usize, total: usize, threshold: usize) -> BudgetDecision {
    let excess = total.saturating_sub(threshold);
    match budget {
        DeletionBudget::PercentageOfExcess { percentage } => {
            let quota = eligible * usize::from(percentage.min(100)) / 100;
            BudgetDecision {
                excess,
                quota,
                to_delete: excess.min(quota),
            }
        }
        DeletionBudget::FlatCap { max_per_cycle } => BudgetDecision {
            excess,
            quota: max_per_cycle,
            to_delete: eligible.min(max_per_cycle),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounded_by_excess() {
        let decision = compute(DeletionBudget::PercentageOfExcess { percentage: 80 }, 500, 500, 400);
        assert_eq!(
            decision,
            BudgetDecision {
                excess: 100,
                quota: 400,
                to_delete: 100
            }
        );
    }

    #[test]
    fn test_percentage_bounded_by_quota() {
        let decision = compute(DeletionBudget::PercentageOfExcess { percentage: 10 }, 55, 900, 400);
        assert_eq!(decision.quota, 5);
        assert_eq!(decision.to_delete, 5);
    }

    #[test]
    fn test_flat_cap_ignores_excess() {
        let decision = compute(DeletionBudget::FlatCap { max_per_cycle: 128 }, 300, 401, 400);
        assert_eq!(decision.excess, 1);
        assert_eq!(decision.to_delete, 128);

        let small = compute(DeletionBudget::FlatCap { max_per_cycle: 128 }, 12, 401, 400);
        assert_eq!(small.to_delete, 12);
    }

    #[test]
    fn test_never_exceeds_eligible() {
        for eligible in [0usize, 1, 7, 99, 1000] {
            for pct in [0u8, 1, 50, 100] {
                let d = compute(DeletionBudget::PercentageOfExcess { percentage: pct }, eligible, 5000, 1);
                assert!(d.to_delete <= eligible);
                assert!(d.to_delete <= d.excess.min(d.quota));
            }
        }
        let zero = compute(DeletionBudget::PercentageOfExcess { percentage: 0 }, 100, 500, 400);
        assert_eq!(zero.to_delete, 0);
    }
}
