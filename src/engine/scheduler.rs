use crate::config::CleanupPolicy;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Host ticks per second is 20, so one tick is 50 logical milliseconds.
pub const MS_PER_TICK: u64 = 50;

pub fn tick_to_ms(tick: u64) -> u64 {
    tick.saturating_mul(MS_PER_TICK)
}

/// Time gate for cleanup firings.
///
/// The first poll only arms the timer; no firing happens before that. Each
/// firing re-arms it with the configured interval plus a small random
/// offset so independent schedulers drift apart.
#[derive(Debug)]
pub struct Scheduler {
    next_due: Option<u64>,
    rng: SmallRng,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            next_due: None,
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            next_due: None,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn next_due(&self) -> Option<u64> {
        self.next_due
    }

    /// `max(1, interval ± uniform(0..=jitter))` with the jitter bounded by
    /// `interval - 1`.
    pub fn delay(&mut self, policy: &CleanupPolicy) -> u64 {
        let base = i64::from(policy.scan_interval_ticks.max(1));
        let jitter = if policy.jitter_enabled {
            i64::from(policy.scan_jitter_ticks).min(base - 1)
        } else {
            0
        };
        let offset = if jitter > 0 {
            self.rng.random_range(-jitter..=jitter)
        } else {
            0
        };
        (base + offset).max(1) as u64
    }

    /// Returns true when a firing is due at `now_tick`. An unarmed
    /// scheduler arms itself and returns false.
    pub fn poll(&mut self, now_tick: u64, policy: &CleanupPolicy) -> bool {
        match self.next_due {
            None => {
                self.rearm(now_tick, policy);
                false
            }
            Some(due) => now_tick >= due,
        }
    }

    pub fn rearm(&mut self, now_tick: u64, policy: &CleanupPolicy) {
        let delay = self.delay(policy);
        self.next_due = Some(now_tick.saturating_add(delay));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(interval: u32, jitter: u32, enabled: bool) -> CleanupPolicy {
        CleanupPolicy {
            scan_interval_ticks: interval,
            scan_jitter_ticks: jitter,
            jitter_enabled: enabled,
            ..CleanupPolicy::default()
        }
    }

    #[test]
    fn test_first_poll_only_arms() {
        let p = policy(20, 0, false);
        let mut scheduler = Scheduler::with_seed(1);
        assert!(!scheduler.poll(100, &p));
        assert_eq!(scheduler.next_due(), Some(120));
        assert!(!scheduler.poll(119, &p));
        assert!(scheduler.poll(120, &p));
        assert!(scheduler.poll(500, &p));
    }

    #[test]
    fn test_delay_stays_within_jitter() {
        let p = policy(20, 2, true);
        let mut scheduler = Scheduler::with_seed(42);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..500 {
            let delay = scheduler.delay(&p);
            assert!((18..=22).contains(&delay));
            seen.insert(delay);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_delay_never_below_one() {
        let p = policy(1, 40, true);
        let mut scheduler = Scheduler::with_seed(7);
        for _ in 0..100 {
            assert_eq!(scheduler.delay(&p), 1);
        }

        let p = policy(2, 40, true);
        for _ in 0..100 {
            assert!((1..=3).contains(&scheduler.delay(&p)));
        }
    }

    #[test]
    fn test_jitter_disabled_is_exact() {
        let p = policy(37, 2, false);
        let mut scheduler = Scheduler::with_seed(3);
        for _ in 0..50 {
            assert_eq!(scheduler.delay(&p), 37);
        }
    }

    #[test]
    fn test_tick_to_ms() {
        assert_eq!(tick_to_ms(6_000), 300_000);
    }
}
