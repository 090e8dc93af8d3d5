use super::settings::{BudgetStrategy, FilterMode, RawSettings};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use tracing::warn;

lazy_static! {
    static ref GROUP_ID: Regex = Regex::new(r"^[a-z0-9_.\-]+:[a-z0-9_.\-/]+$").unwrap();
}

/// How many eligible objects one cycle may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionBudget {
    /// `min(excess, floor(eligible * percentage / 100))`.
    PercentageOfExcess { percentage: u8 },
    /// `min(eligible, max_per_cycle)`, population excess is not consulted.
    FlatCap { max_per_cycle: usize },
}

impl fmt::Display for DeletionBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PercentageOfExcess { percentage } => write!(f, "pct={}%", percentage),
            Self::FlatCap { max_per_cycle } => write!(f, "cap={}", max_per_cycle),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEntry {
    /// Matches one classification key exactly.
    Exact(String),
    /// Matches every object that belongs to the named tag-group.
    Group(String),
}

impl FilterEntry {
    /// Parses one `filterList` line. Blank lines and malformed group ids
    /// yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.strip_prefix('#') {
            Some(group) if GROUP_ID.is_match(group) => Some(Self::Group(group.to_string())),
            Some(_) => None,
            None => Some(Self::Exact(raw.to_string())),
        }
    }
}

/// Validated runtime snapshot of the cleanup settings. Immutable once baked;
/// a reload produces a new value instead of mutating this one.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupPolicy {
    pub scan_interval_ticks: u32,
    pub scan_jitter_ticks: u32,
    pub jitter_enabled: bool,
    pub entity_count_threshold: usize,
    pub budget: DeletionBudget,
    pub min_item_age_ms: u64,
    pub protect_named_items: bool,
    pub player_safe_radius: u32,
    pub filter_mode: FilterMode,
    pub filter: Vec<FilterEntry>,
    pub scan_near_anchors_only: bool,
    pub fallback_view_distance_chunks: u32,
    pub prune_missing_records: bool,
}

impl CleanupPolicy {
    /// Builds the effective policy from raw settings, clamping every value
    /// into its documented range.
    pub fn bake(raw: &RawSettings) -> Self {
        let budget = match raw.budget_strategy {
            BudgetStrategy::Percentage => DeletionBudget::PercentageOfExcess {
                percentage: clamp_setting("deletePercentage", raw.delete_percentage, 0, 100) as u8,
            },
            BudgetStrategy::FlatCap => DeletionBudget::FlatCap {
                max_per_cycle: clamp_setting(
                    "maxDeletesPerCycle",
                    raw.max_deletes_per_cycle,
                    1,
                    10_000,
                ) as usize,
            },
        };

        let mut filter = Vec::with_capacity(raw.filter_list.len());
        for line in &raw.filter_list {
            match FilterEntry::parse(line) {
                Some(entry) => filter.push(entry),
                None if line.trim().is_empty() => {}
                None => warn!(entry = %line, "ignoring malformed filter entry"),
            }
        }

        Self {
            scan_interval_ticks: clamp_setting("scanIntervalTicks", raw.scan_interval_ticks, 1, 20_000)
                as u32,
            scan_jitter_ticks: clamp_setting("scanJitterTicks", raw.scan_jitter_ticks, 0, 40) as u32,
            jitter_enabled: raw.jitter_enabled,
            entity_count_threshold: clamp_setting(
                "entityCountThreshold",
                raw.entity_count_threshold,
                1,
                10_000,
            ) as usize,
            budget,
            min_item_age_ms: clamp_setting("minItemAgeMs", raw.min_item_age_ms, 0, 86_400_000) as u64,
            protect_named_items: raw.protect_named_items,
            player_safe_radius: clamp_setting("playerSafeRadius", raw.player_safe_radius, 0, 256) as u32,
            filter_mode: raw.filter_mode,
            filter,
            scan_near_anchors_only: raw.scan_near_anchors_only,
            fallback_view_distance_chunks: clamp_setting(
                "fallbackViewDistanceChunks",
                raw.fallback_view_distance_chunks,
                2,
                64,
            ) as u32,
            prune_missing_records: raw.prune_missing_records,
        }
    }
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::bake(&RawSettings::default())
    }
}

fn clamp_setting(name: &'static str, value: i64, min: i64, max: i64) -> i64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(setting = name, value, min, max, "clamped out-of-range cleanup setting");
    }
    clamped
}
