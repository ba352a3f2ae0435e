use super::settings::{
    AnalyticsConfig, QuotaConfig, RetentionConfig, StorageConfig, ThreatConfig,
};

// ---------------------------------------------------------------------------
// Top-level struct defaults
// ---------------------------------------------------------------------------

pub fn default_storage_config() -> StorageConfig {
    StorageConfig {
        db_path: default_db_path(),
    }
}

pub fn default_analytics_config() -> AnalyticsConfig {
    AnalyticsConfig {
        baseline_window_days: default_baseline_window_days(),
        velocity_threshold_per_minute: default_velocity_threshold_per_minute(),
        high_velocity_per_minute: default_high_velocity_per_minute(),
        off_hours_start: default_off_hours_start(),
        off_hours_end: default_off_hours_end(),
        session_gap_hours: default_session_gap_hours(),
        retention_days: default_behavior_retention_days(),
        score_medium: default_score_medium(),
        score_high: default_score_high(),
        score_critical: default_score_critical(),
    }
}

pub fn default_threat_config() -> ThreatConfig {
    ThreatConfig {
        retention_days: default_threat_retention_days(),
        bad_prefixes: Vec::new(),
    }
}

pub fn default_quota_config() -> QuotaConfig {
    QuotaConfig {
        free_tier_id: default_free_tier_id(),
        system_tier_id: default_system_tier_id(),
        trusted_account_ids: Vec::new(),
        tier_cache_ttl_secs: default_tier_cache_ttl_secs(),
        rate_limit_cache_ttl_secs: default_rate_limit_cache_ttl_secs(),
        warning_threshold_percent: default_warning_threshold_percent(),
    }
}

pub fn default_retention_config() -> RetentionConfig {
    RetentionConfig {
        sweep_interval_secs: default_sweep_interval_secs(),
    }
}

// ---------------------------------------------------------------------------
// Field defaults
// ---------------------------------------------------------------------------

pub fn default_db_path() -> String {
    "vigil.db".to_string()
}

pub fn default_baseline_window_days() -> i64 {
    30
}

pub fn default_velocity_threshold_per_minute() -> i64 {
    10
}

pub fn default_high_velocity_per_minute() -> i64 {
    30
}

pub fn default_off_hours_start() -> u32 {
    8
}

pub fn default_off_hours_end() -> u32 {
    18
}

pub fn default_session_gap_hours() -> i64 {
    8
}

pub fn default_behavior_retention_days() -> i64 {
    30
}

pub fn default_score_medium() -> f64 {
    0.4
}

pub fn default_score_high() -> f64 {
    0.6
}

pub fn default_score_critical() -> f64 {
    0.8
}

pub fn default_threat_retention_days() -> i64 {
    90
}

pub fn default_free_tier_id() -> i64 {
    1
}

pub fn default_system_tier_id() -> i64 {
    0
}

pub fn default_tier_cache_ttl_secs() -> u64 {
    900
}

pub fn default_rate_limit_cache_ttl_secs() -> u64 {
    1800
}

pub fn default_warning_threshold_percent() -> i64 {
    80
}

pub fn default_sweep_interval_secs() -> u64 {
    3600
}
