use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use super::defaults;

/// Top-level configuration for the vigil analytics engine.
/// Deserializes from a TOML configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "defaults::default_storage_config")]
    pub storage: StorageConfig,

    #[serde(default = "defaults::default_analytics_config")]
    pub analytics: AnalyticsConfig,

    #[serde(default = "defaults::default_threat_config")]
    pub threat: ThreatConfig,

    #[serde(default = "defaults::default_quota_config")]
    pub quota: QuotaConfig,

    #[serde(default = "defaults::default_retention_config")]
    pub retention: RetentionConfig,
}

impl Settings {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: defaults::default_storage_config(),
            analytics: defaults::default_analytics_config(),
            threat: defaults::default_threat_config(),
            quota: defaults::default_quota_config(),
            retention: defaults::default_retention_config(),
        }
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::default_db_path")]
    pub db_path: String,
}

/// Behavioral analytics thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Trailing history window used for scoring and baselines.
    #[serde(default = "defaults::default_baseline_window_days")]
    pub baseline_window_days: i64,

    /// Records in the trailing 60s above which the scorer adds its
    /// velocity penalty.
    #[serde(default = "defaults::default_velocity_threshold_per_minute")]
    pub velocity_threshold_per_minute: i64,

    /// Actions-per-minute above which a record is flagged high-velocity.
    #[serde(default = "defaults::default_high_velocity_per_minute")]
    pub high_velocity_per_minute: i64,

    /// Hours outside [start, end] (or weekends) count as off-hours.
    #[serde(default = "defaults::default_off_hours_start")]
    pub off_hours_start: u32,

    #[serde(default = "defaults::default_off_hours_end")]
    pub off_hours_end: u32,

    /// Gap above which the previous record no longer counts as the same
    /// session.
    #[serde(default = "defaults::default_session_gap_hours")]
    pub session_gap_hours: i64,

    /// Behavior record retention for the cleanup sweep.
    #[serde(default = "defaults::default_behavior_retention_days")]
    pub retention_days: i64,

    #[serde(default = "defaults::default_score_medium")]
    pub score_medium: f64,

    #[serde(default = "defaults::default_score_high")]
    pub score_high: f64,

    #[serde(default = "defaults::default_score_critical")]
    pub score_critical: f64,
}

/// Threat intelligence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreatConfig {
    /// Threat record retention (blacklisted/whitelisted records are kept).
    #[serde(default = "defaults::default_threat_retention_days")]
    pub retention_days: i64,

    /// CIDR prefixes treated as known-bad sources.
    #[serde(default)]
    pub bad_prefixes: Vec<String>,
}

/// Subscription tier and quota configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "defaults::default_free_tier_id")]
    pub free_tier_id: i64,

    #[serde(default = "defaults::default_system_tier_id")]
    pub system_tier_id: i64,

    /// System accounts that bypass quotas and rate limits entirely.
    #[serde(default)]
    pub trusted_account_ids: Vec<i64>,

    #[serde(default = "defaults::default_tier_cache_ttl_secs")]
    pub tier_cache_ttl_secs: u64,

    #[serde(default = "defaults::default_rate_limit_cache_ttl_secs")]
    pub rate_limit_cache_ttl_secs: u64,

    /// Percentage of the daily quota at which the once-per-day warning
    /// fires.
    #[serde(default = "defaults::default_warning_threshold_percent")]
    pub warning_threshold_percent: i64,
}

/// Periodic cleanup sweeper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "defaults::default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.analytics.baseline_window_days, 30);
        assert_eq!(settings.analytics.velocity_threshold_per_minute, 10);
        assert_eq!(settings.analytics.high_velocity_per_minute, 30);
        assert_eq!(settings.analytics.retention_days, 30);
        assert_eq!(settings.threat.retention_days, 90);
        assert_eq!(settings.quota.tier_cache_ttl_secs, 900);
        assert_eq!(settings.quota.rate_limit_cache_ttl_secs, 1800);
        assert_eq!(settings.quota.warning_threshold_percent, 80);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [analytics]
            baseline_window_days = 14

            [quota]
            trusted_account_ids = [1, 2]
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.analytics.baseline_window_days, 14);
        assert_eq!(settings.analytics.velocity_threshold_per_minute, 10);
        assert_eq!(settings.quota.trusted_account_ids, vec![1, 2]);
        assert_eq!(settings.threat.retention_days, 90);
    }
}
