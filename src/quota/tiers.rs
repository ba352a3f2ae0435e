use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::config::settings::QuotaConfig;
use crate::models::quota::SubscriptionTier;
use crate::storage::cache::TtlCache;
use crate::storage::sqlite::SqliteStore;

/// Resolves the effective subscription tier for a user.
///
/// The trusted-account set is injected at construction so tests can
/// substitute arbitrary lists; it is never global state. Resolutions are
/// cached per user with a fixed TTL and no invalidation on tier changes.
pub struct TierResolver {
    store: Arc<SqliteStore>,
    cache: TtlCache<i64, SubscriptionTier>,
    trusted: HashSet<i64>,
    free_tier_id: i64,
    system_tier_id: i64,
}

impl TierResolver {
    pub fn new(store: Arc<SqliteStore>, config: &QuotaConfig) -> Self {
        Self {
            store,
            cache: TtlCache::new(Duration::from_secs(config.tier_cache_ttl_secs)),
            trusted: config.trusted_account_ids.iter().copied().collect(),
            free_tier_id: config.free_tier_id,
            system_tier_id: config.system_tier_id,
        }
    }

    pub fn is_trusted(&self, user_id: i64) -> bool {
        self.trusted.contains(&user_id)
    }

    /// Resolve a user's tier: cache, then the trusted-account system tier,
    /// then the user's own quota-linked tier, then the Free tier. A missing
    /// Free tier is a configuration error and resolution fails.
    pub fn resolve(&self, user_id: i64) -> Result<SubscriptionTier> {
        if let Some(tier) = self.cache.get(&user_id) {
            return Ok(tier);
        }

        if self.is_trusted(user_id) {
            match self.system_tier()? {
                Some(tier) => {
                    self.cache.insert(user_id, tier.clone());
                    return Ok(tier);
                }
                None => {
                    warn!(user_id, "Trusted account but no system tier configured");
                }
            }
        }

        if let Some(quota) = self.store.get_user_quota(user_id)? {
            if let Some(tier) = self.store.get_tier_by_id(quota.subscription_tier_id)? {
                debug!(user_id, tier = %tier.name, "Resolved tier from user quota");
                self.cache.insert(user_id, tier.clone());
                return Ok(tier);
            }
        }

        let free = match self.store.get_tier_by_id(self.free_tier_id)? {
            Some(tier) => Some(tier),
            None => self.store.get_tier_by_name("Free")?,
        };
        match free {
            Some(tier) => {
                self.cache.insert(user_id, tier.clone());
                Ok(tier)
            }
            None => bail!(
                "No Free subscription tier configured (id {} or name \"Free\"); \
                 tier resolution cannot proceed",
                self.free_tier_id
            ),
        }
    }

    fn system_tier(&self) -> Result<Option<SubscriptionTier>> {
        match self.store.get_tier_by_id(self.system_tier_id)? {
            Some(tier) => Ok(Some(tier)),
            None => Ok(self.store.get_tier_by_name("System")?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::models::quota::UserQuota;
    use chrono::{TimeZone, Utc};

    fn free_tier() -> SubscriptionTier {
        SubscriptionTier {
            id: 1,
            name: "Free".to_string(),
            is_system_tier: false,
            bypass_standard_rate_limits: false,
            daily_api_quota: 1000,
            default_rate_limit: 60,
            default_time_window_secs: 60,
        }
    }

    fn system_tier() -> SubscriptionTier {
        SubscriptionTier {
            id: 0,
            name: "System".to_string(),
            is_system_tier: true,
            bypass_standard_rate_limits: true,
            daily_api_quota: i64::MAX,
            default_rate_limit: i64::MAX,
            default_time_window_secs: 60,
        }
    }

    fn premium_tier() -> SubscriptionTier {
        SubscriptionTier {
            id: 2,
            name: "Premium".to_string(),
            is_system_tier: false,
            bypass_standard_rate_limits: false,
            daily_api_quota: 100_000,
            default_rate_limit: 600,
            default_time_window_secs: 60,
        }
    }

    #[test]
    fn test_falls_back_to_free_tier() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_tier(&free_tier()).unwrap();
        let resolver = TierResolver::new(store, &defaults::default_quota_config());
        let tier = resolver.resolve(42).unwrap();
        assert_eq!(tier.name, "Free");
    }

    #[test]
    fn test_missing_free_tier_is_fatal() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let resolver = TierResolver::new(store, &defaults::default_quota_config());
        assert!(resolver.resolve(42).is_err());
    }

    #[test]
    fn test_trusted_account_gets_system_tier() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_tier(&free_tier()).unwrap();
        store.upsert_tier(&system_tier()).unwrap();
        let mut config = defaults::default_quota_config();
        config.trusted_account_ids = vec![99];
        let resolver = TierResolver::new(store, &config);

        let tier = resolver.resolve(99).unwrap();
        assert!(tier.is_system_tier);
        let tier = resolver.resolve(42).unwrap();
        assert_eq!(tier.name, "Free");
    }

    #[test]
    fn test_quota_linked_tier_wins_over_free() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_tier(&free_tier()).unwrap();
        store.upsert_tier(&premium_tier()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        store
            .upsert_user_quota(&UserQuota {
                user_id: 7,
                subscription_tier_id: 2,
                api_calls_used_today: 0,
                max_daily_api_calls: 100_000,
                last_reset: now,
                last_updated: now,
                is_exempt_from_quota: false,
                has_received_quota_warning: false,
            })
            .unwrap();

        let resolver = TierResolver::new(store, &defaults::default_quota_config());
        assert_eq!(resolver.resolve(7).unwrap().name, "Premium");
    }

    #[test]
    fn test_resolution_is_cached() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_tier(&free_tier()).unwrap();
        let resolver = TierResolver::new(store.clone(), &defaults::default_quota_config());
        assert_eq!(resolver.resolve(42).unwrap().name, "Free");

        // A tier change inside the TTL is not observed; staleness up to the
        // TTL is the contract.
        let mut renamed = free_tier();
        renamed.name = "Starter".to_string();
        store.upsert_tier(&renamed).unwrap();
        assert_eq!(resolver.resolve(42).unwrap().name, "Free");
    }
}
