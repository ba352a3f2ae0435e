use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, Utc};
use tracing::{debug, warn};

use crate::config::settings::QuotaConfig;
use crate::models::quota::{RemainingQuota, UserQuota};
use crate::quota::tiers::TierResolver;
use crate::storage::sqlite::SqliteStore;

/// Tracks per-user daily API usage against the quota of their tier.
///
/// Counters roll over at UTC midnight: any read or write that observes a
/// `last_reset` from a previous day resets the counter first, then applies
/// its own operation. Store failures fail open so quota enforcement never
/// takes down request handling.
///
/// Counter updates are read-modify-write, serialized only by the store's
/// connection mutex; concurrent writers in other processes can lose
/// increments.
pub struct QuotaTracker {
    store: Arc<SqliteStore>,
    tiers: Arc<TierResolver>,
    warning_threshold_percent: i64,
}

impl QuotaTracker {
    pub fn new(store: Arc<SqliteStore>, tiers: Arc<TierResolver>, config: &QuotaConfig) -> Self {
        Self {
            store,
            tiers,
            warning_threshold_percent: config.warning_threshold_percent,
        }
    }

    /// Whether the user has consumed their full daily allowance.
    ///
    /// Trusted accounts, exempt users and users with no quota row are never
    /// considered exceeded.
    pub fn has_exceeded_daily_quota(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        if self.tiers.is_trusted(user_id) {
            return false;
        }

        let mut quota = match self.store.get_user_quota(user_id) {
            Ok(Some(quota)) => quota,
            Ok(None) => return false,
            Err(e) => {
                warn!(user_id, error = %e, "Quota lookup failed; allowing request");
                return false;
            }
        };

        if quota.is_exempt_from_quota {
            return false;
        }

        if rollover(&mut quota, now) {
            if let Err(e) = self.store.upsert_user_quota(&quota) {
                warn!(user_id, error = %e, "Failed to persist quota rollover");
            }
        }

        quota.api_calls_used_today >= quota.max_daily_api_calls
    }

    /// Record `count` API calls for the user. Returns false only when the
    /// user has a quota row and the write failed; callers treat false as
    /// "usage not recorded", not as a denial.
    pub fn increment_usage(&self, user_id: i64, count: i64, now: DateTime<Utc>) -> bool {
        if self.tiers.is_trusted(user_id) {
            return true;
        }

        let mut quota = match self.store.get_user_quota(user_id) {
            Ok(Some(quota)) => quota,
            Ok(None) => {
                debug!(user_id, "No quota row; usage not tracked");
                return false;
            }
            Err(e) => {
                warn!(user_id, error = %e, "Quota lookup failed; usage not recorded");
                return false;
            }
        };

        if quota.is_exempt_from_quota {
            return true;
        }

        // Reset first, then apply, so a call straddling midnight counts
        // against the new day only.
        rollover(&mut quota, now);
        quota.api_calls_used_today += count;
        quota.last_updated = now;

        let threshold = quota.max_daily_api_calls * self.warning_threshold_percent / 100;
        if !quota.has_received_quota_warning && quota.api_calls_used_today >= threshold {
            quota.has_received_quota_warning = true;
            warn!(
                user_id,
                used = quota.api_calls_used_today,
                max = quota.max_daily_api_calls,
                "User approaching daily API quota"
            );
        }

        match self.store.upsert_user_quota(&quota) {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to persist quota usage");
                false
            }
        }
    }

    /// Remaining calls for today and the next reset instant. Trusted and
    /// exempt users report an effectively infinite allowance.
    pub fn get_remaining_quota(&self, user_id: i64, now: DateTime<Utc>) -> RemainingQuota {
        if self.tiers.is_trusted(user_id) {
            return unlimited_quota();
        }

        let quota = match self.store.get_user_quota(user_id) {
            Ok(quota) => quota,
            Err(e) => {
                warn!(user_id, error = %e, "Quota lookup failed; reporting unlimited");
                return unlimited_quota();
            }
        };

        let mut quota = match quota {
            Some(quota) => quota,
            None => {
                // No row yet: the full tier allowance is available.
                let allowance = match self.tiers.resolve(user_id) {
                    Ok(tier) => tier.daily_api_quota,
                    Err(e) => {
                        warn!(user_id, error = %e, "Tier resolution failed; reporting unlimited");
                        return unlimited_quota();
                    }
                };
                return RemainingQuota {
                    remaining: allowance,
                    resets_at: next_utc_midnight(now),
                };
            }
        };

        if quota.is_exempt_from_quota {
            return unlimited_quota();
        }

        if rollover(&mut quota, now) {
            if let Err(e) = self.store.upsert_user_quota(&quota) {
                warn!(user_id, error = %e, "Failed to persist quota rollover");
            }
        }

        RemainingQuota {
            remaining: (quota.max_daily_api_calls - quota.api_calls_used_today).max(0),
            resets_at: next_utc_midnight(now),
        }
    }
}

/// Reset the counter if `last_reset` falls on an earlier UTC day than `now`.
/// Returns true when a reset happened.
fn rollover(quota: &mut UserQuota, now: DateTime<Utc>) -> bool {
    if quota.last_reset.date_naive() < now.date_naive() {
        quota.api_calls_used_today = 0;
        quota.has_received_quota_warning = false;
        quota.last_reset = now;
        true
    } else {
        false
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn unlimited_quota() -> RemainingQuota {
    RemainingQuota {
        remaining: i64::MAX,
        resets_at: DateTime::<Utc>::MAX_UTC,
    }
}
