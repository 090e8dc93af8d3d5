use crate::core::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which side of the filter list is deletable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterMode {
    /// Everything except listed objects may be deleted.
    #[default]
    #[serde(alias = "BLACKLIST")]
    Denylist,
    /// Only listed objects may be deleted.
    #[serde(alias = "WHITELIST")]
    Allowlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetStrategy {
    #[default]
    Percentage,
    FlatCap,
}

/// Cleanup settings as written by an operator. Values are not trusted:
/// every numeric field is clamped when the settings are baked into a
/// [`CleanupPolicy`](super::CleanupPolicy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSettings {
    pub scan_interval_ticks: i64,
    pub scan_jitter_ticks: i64,
    #[serde(alias = "scanJitterEnabled")]
    pub jitter_enabled: bool,
    pub entity_count_threshold: i64,
    pub budget_strategy: BudgetStrategy,
    pub delete_percentage: i64,
    pub max_deletes_per_cycle: i64,
    pub min_item_age_ms: i64,
    pub protect_named_items: bool,
    pub player_safe_radius: i64,
    pub filter_mode: FilterMode,
    /// Exact classification keys, or `#namespace:path` tag-groups.
    pub filter_list: Vec<String>,
    pub scan_near_anchors_only: bool,
    pub fallback_view_distance_chunks: i64,
    pub prune_missing_records: bool,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            scan_interval_ticks: 20,
            scan_jitter_ticks: 2,
            jitter_enabled: true,
            entity_count_threshold: 400,
            budget_strategy: BudgetStrategy::Percentage,
            delete_percentage: 80,
            max_deletes_per_cycle: 128,
            min_item_age_ms: 15_000,
            protect_named_items: true,
            player_safe_radius: 8,
            filter_mode: FilterMode::Denylist,
            filter_list: vec![
                "minecraft:nether_star".to_string(),
                "#modid:valuable".to_string(),
            ],
            scan_near_anchors_only: true,
            fallback_view_distance_chunks: 10,
            prune_missing_records: true,
        }
    }
}

impl RawSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SweepError::ConfigError(format!("Failed to parse settings: {}", e)))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SweepError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SweepError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let raw = RawSettings::from_json_str(
            r#"{ "entityCountThreshold": 250, "filterMode": "ALLOWLIST" }"#,
        )
        .unwrap();

        assert_eq!(raw.entity_count_threshold, 250);
        assert_eq!(raw.filter_mode, FilterMode::Allowlist);
        assert_eq!(raw.scan_interval_ticks, 20);
        assert_eq!(raw.delete_percentage, 80);
        assert_eq!(raw.filter_list.len(), 2);
    }

    #[test]
    fn test_legacy_names_accepted() {
        let raw = RawSettings::from_json_str(
            r#"{ "filterMode": "WHITELIST", "scanJitterEnabled": false, "budgetStrategy": "flatCap" }"#,
        )
        .unwrap();

        assert_eq!(raw.filter_mode, FilterMode::Allowlist);
        assert!(!raw.jitter_enabled);
        assert_eq!(raw.budget_strategy, BudgetStrategy::FlatCap);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = RawSettings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SweepError::ConfigError(_)));
    }
}
