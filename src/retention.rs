use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::analytics::ledger::BehaviorLedger;
use crate::config::settings::{AnalyticsConfig, RetentionConfig};
use crate::threat::intelligence::ThreatIntelligence;

/// Periodic retention sweeper for the behavior ledger and threat store.
///
/// Each pass deletes behavior records past their window and expired threat
/// records (blacklisted and whitelisted entries are never aged out). Sweeps
/// run on a fixed interval; failures inside a pass are already logged and
/// absorbed by the engines, so the loop never dies.
pub struct RetentionSweeper {
    ledger: Arc<BehaviorLedger>,
    threats: Arc<ThreatIntelligence>,
    behavior_retention_days: i64,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        ledger: Arc<BehaviorLedger>,
        threats: Arc<ThreatIntelligence>,
        analytics: &AnalyticsConfig,
        retention: &RetentionConfig,
    ) -> Self {
        Self {
            ledger,
            threats,
            behavior_retention_days: analytics.retention_days,
            sweep_interval: Duration::from_secs(retention.sweep_interval_secs),
        }
    }

    /// Run a single sweep. Returns (behavior records deleted, threat records
    /// deleted).
    pub fn run_once(&self, now: chrono::DateTime<Utc>) -> (usize, usize) {
        debug!("Starting retention sweep");
        let behavior = self
            .ledger
            .cleanup_old_records(self.behavior_retention_days, now);
        let threats = self
            .threats
            .cleanup_old_threats(self.threats.retention_days(), now);
        if behavior > 0 || threats > 0 {
            info!(behavior, threats, "Retention sweep deleted records");
        }
        (behavior, threats)
    }

    /// Spawn the background sweep loop. The first tick fires after one full
    /// interval, not immediately.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.run_once(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::ledger::ActivityEvent;
    use crate::config::defaults;
    use crate::storage::sqlite::SqliteStore;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    #[test]
    fn test_run_once_deletes_only_expired_records() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let analytics = defaults::default_analytics_config();
        let threat_config = defaults::default_threat_config();
        let ledger = Arc::new(BehaviorLedger::new(store.clone(), analytics.clone()));
        let threats = Arc::new(ThreatIntelligence::new(store.clone(), &threat_config));
        let sweeper = RetentionSweeper::new(
            ledger.clone(),
            threats,
            &analytics,
            &defaults::default_retention_config(),
        );

        let now = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        let old = now - ChronoDuration::days(40);
        for (ts, action) in [(old, "login"), (now, "task_create")] {
            ledger.log_activity(&ActivityEvent {
                user_id: 7,
                username: "alice".to_string(),
                ip_address: "203.0.113.9".to_string(),
                user_agent: "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0".to_string(),
                action_type: action.to_string(),
                resource_accessed: "/api/v1/tasks".to_string(),
                data_volume_accessed: 0,
                timestamp: ts,
            });
        }

        let (behavior_deleted, threat_deleted) = sweeper.run_once(now);
        assert_eq!(behavior_deleted, 1);
        assert_eq!(threat_deleted, 0);

        let from = now - ChronoDuration::days(365);
        let remaining = store
            .query_by_user(7, from, now + ChronoDuration::seconds(1))
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].action_type, "task_create");
    }
}
