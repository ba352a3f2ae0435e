use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::config::settings::QuotaConfig;
use crate::models::quota::ResolvedRateLimit;
use crate::quota::tiers::TierResolver;
use crate::storage::cache::TtlCache;
use crate::storage::sqlite::SqliteStore;

/// Resolves the most specific rate-limit rule for a user's tier and an
/// endpoint. Rules are tried in descending match-priority order; the first
/// wildcard match wins, and the tier's own default applies when nothing
/// matches. Results are cached per (tier, endpoint).
pub struct RateLimitResolver {
    store: Arc<SqliteStore>,
    tiers: Arc<TierResolver>,
    cache: TtlCache<(i64, String), ResolvedRateLimit>,
}

impl RateLimitResolver {
    pub fn new(store: Arc<SqliteStore>, tiers: Arc<TierResolver>, config: &QuotaConfig) -> Self {
        Self {
            store,
            tiers,
            cache: TtlCache::new(Duration::from_secs(config.rate_limit_cache_ttl_secs)),
        }
    }

    pub fn resolve(&self, user_id: i64, endpoint: &str) -> Result<ResolvedRateLimit> {
        let tier = self.tiers.resolve(user_id)?;

        if tier.is_system_tier && tier.bypass_standard_rate_limits {
            return Ok(ResolvedRateLimit::unlimited());
        }

        let key = (tier.id, endpoint.to_lowercase());
        if let Some(resolved) = self.cache.get(&key) {
            return Ok(resolved);
        }

        // Rules arrive ordered by match_priority descending.
        let rules = self.store.list_rules(tier.id)?;
        let resolved = rules
            .iter()
            .find(|rule| wildcard_matches(&rule.endpoint_pattern, endpoint))
            .map(|rule| {
                debug!(
                    user_id,
                    endpoint,
                    pattern = %rule.endpoint_pattern,
                    priority = rule.match_priority,
                    "Rate-limit rule matched"
                );
                ResolvedRateLimit {
                    limit: rule.rate_limit,
                    window_secs: rule.time_window_secs,
                }
            })
            .unwrap_or(ResolvedRateLimit {
                limit: tier.default_rate_limit,
                window_secs: tier.default_time_window_secs,
            });

        self.cache.insert(key, resolved);
        Ok(resolved)
    }
}

/// Case-insensitive full-string wildcard match where `*` matches any
/// substring (including empty). Literal segments are anchored: text before
/// the first `*` must prefix the value and text after the last `*` must
/// suffix it.
pub fn wildcard_matches(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();

    if !pattern.contains('*') {
        return pattern == value;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let first = segments[0];
    let last = segments[segments.len() - 1];

    if !value.starts_with(first) {
        return false;
    }
    if value.len() < first.len() + last.len() || !value.ends_with(last) {
        return false;
    }

    // Greedy left-to-right scan for the middle segments over the span
    // between the anchored prefix and suffix.
    let mut pos = first.len();
    let end = value.len() - last.len();
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match value[pos..end].find(segment) {
            Some(found) => pos += found + segment.len(),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::models::quota::{RateLimitRule, SubscriptionTier};

    fn rule(tier_id: i64, pattern: &str, limit: i64, priority: i64) -> RateLimitRule {
        RateLimitRule {
            id: 0,
            subscription_tier_id: tier_id,
            endpoint_pattern: pattern.to_string(),
            rate_limit: limit,
            time_window_secs: 60,
            match_priority: priority,
        }
    }

    fn setup() -> (Arc<SqliteStore>, RateLimitResolver) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_tier(&SubscriptionTier {
                id: 1,
                name: "Free".to_string(),
                is_system_tier: false,
                bypass_standard_rate_limits: false,
                daily_api_quota: 1000,
                default_rate_limit: 60,
                default_time_window_secs: 60,
            })
            .unwrap();
        let config = defaults::default_quota_config();
        let tiers = Arc::new(TierResolver::new(store.clone(), &config));
        let resolver = RateLimitResolver::new(store.clone(), tiers, &config);
        (store, resolver)
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(wildcard_matches("*", "/api/v1/tasks"));
        assert!(wildcard_matches("/api/*", "/api/v1/tasks"));
        assert!(wildcard_matches("/api/*/tasks", "/api/v1/tasks"));
        assert!(wildcard_matches("*/tasks", "/api/v1/tasks"));
        assert!(wildcard_matches("/API/V1/TASKS", "/api/v1/tasks"));
        assert!(wildcard_matches("/api/*", "/api/"));

        assert!(!wildcard_matches("/api/*/boards", "/api/v1/tasks"));
        assert!(!wildcard_matches("/api/v1/tasks", "/api/v1/tasks/123"));
        assert!(!wildcard_matches("/admin/*", "/api/v1/tasks"));
        // Full-string semantics: a bare literal never matches a longer value.
        assert!(!wildcard_matches("tasks", "/api/v1/tasks"));
    }

    #[test]
    fn test_higher_priority_rule_wins() {
        let (store, resolver) = setup();
        store.add_rule(&rule(1, "/api/*", 10, 1)).unwrap();
        store.add_rule(&rule(1, "/api/v1/tasks", 2, 5)).unwrap();

        let resolved = resolver.resolve(42, "/api/v1/tasks").unwrap();
        assert_eq!(resolved.limit, 2);
    }

    #[test]
    fn test_falls_back_to_tier_default() {
        let (store, resolver) = setup();
        store.add_rule(&rule(1, "/admin/*", 5, 10)).unwrap();

        let resolved = resolver.resolve(42, "/api/v1/tasks").unwrap();
        assert_eq!(resolved.limit, 60);
        assert_eq!(resolved.window_secs, 60);
    }

    #[test]
    fn test_system_tier_bypass_is_unlimited() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_tier(&SubscriptionTier {
                id: 0,
                name: "System".to_string(),
                is_system_tier: true,
                bypass_standard_rate_limits: true,
                daily_api_quota: i64::MAX,
                default_rate_limit: i64::MAX,
                default_time_window_secs: 60,
            })
            .unwrap();
        let mut config = defaults::default_quota_config();
        config.trusted_account_ids = vec![99];
        let tiers = Arc::new(TierResolver::new(store.clone(), &config));
        let resolver = RateLimitResolver::new(store, tiers, &config);

        let resolved = resolver.resolve(99, "/api/v1/tasks").unwrap();
        assert_eq!(resolved, ResolvedRateLimit::unlimited());
        assert_eq!(resolved.limit, i64::MAX);
    }

    #[test]
    fn test_resolution_is_cached_per_endpoint() {
        let (store, resolver) = setup();
        store.add_rule(&rule(1, "/api/*", 10, 1)).unwrap();
        assert_eq!(resolver.resolve(42, "/api/v1/tasks").unwrap().limit, 10);

        // A new, higher-priority rule inside the TTL is not observed for the
        // cached endpoint, but is for a fresh one.
        store.add_rule(&rule(1, "/api/v1/tasks", 2, 5)).unwrap();
        assert_eq!(resolver.resolve(42, "/api/v1/tasks").unwrap().limit, 10);
        assert_eq!(resolver.resolve(42, "/api/v1/boards").unwrap().limit, 10);
    }
}
