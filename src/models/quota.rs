use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named subscription class governing daily quota and per-endpoint rate
/// limits. Read-mostly reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub id: i64,
    pub name: String,
    pub is_system_tier: bool,
    pub bypass_standard_rate_limits: bool,
    pub daily_api_quota: i64,
    pub default_rate_limit: i64,
    pub default_time_window_secs: i64,
}

/// A per-tier rate-limit rule. `endpoint_pattern` is a wildcard string where
/// `*` matches any substring; on overlapping matches the highest
/// `match_priority` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub id: i64,
    pub subscription_tier_id: i64,
    pub endpoint_pattern: String,
    pub rate_limit: i64,
    pub time_window_secs: i64,
    pub match_priority: i64,
}

/// Per-user daily API usage counter. `api_calls_used_today` resets at the
/// UTC midnight boundary; `has_received_quota_warning` flips once per day
/// and resets with the counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuota {
    pub user_id: i64,
    pub subscription_tier_id: i64,
    pub api_calls_used_today: i64,
    pub max_daily_api_calls: i64,
    pub last_reset: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub is_exempt_from_quota: bool,
    pub has_received_quota_warning: bool,
}

/// Resolved (limit, window) pair for a tier+endpoint lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRateLimit {
    pub limit: i64,
    pub window_secs: i64,
}

impl ResolvedRateLimit {
    /// Effectively unlimited, used for system tiers with bypass enabled.
    pub fn unlimited() -> Self {
        Self {
            limit: i64::MAX,
            window_secs: 60,
        }
    }
}

/// Remaining daily quota and the instant it next resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingQuota {
    pub remaining: i64,
    pub resets_at: DateTime<Utc>,
}
