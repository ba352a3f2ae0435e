use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::analytics::baseline::BaselineBuilder;
use crate::analytics::classifier::{classify_ip, parse_user_agent};
use crate::analytics::scorer::{is_off_hours, AnomalyScorer};
use crate::config::settings::AnalyticsConfig;
use crate::models::behavior::{BehaviorRecord, RiskLevel, UserBaseline};

use crate::storage::sqlite::SqliteStore;

/// A raw observed action before enrichment.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub user_id: i64,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub action_type: String,
    pub resource_accessed: String,
    pub data_volume_accessed: i64,
    pub timestamp: DateTime<Utc>,
}

/// Binary deviation metric: actions inside the baseline's typical set are
/// near the baseline, everything else is far. Deliberately crude; isolated
/// here so a continuous distance can replace it without touching callers.
pub fn deviation_from_baseline(baseline: &UserBaseline, action_type: &str) -> f64 {
    if baseline
        .typical_action_types
        .iter()
        .any(|a| a == action_type)
    {
        0.1
    } else {
        0.8
    }
}

/// Append-only writer for the behavior ledger. Each observed action is
/// enriched (geo/device tags, session duration, velocity, anomaly verdict)
/// and persisted as one immutable record.
///
/// Writes are fire-and-forget: every failure is logged and swallowed so the
/// audit trail can never block or fail the primary request.
pub struct BehaviorLedger {
    store: Arc<SqliteStore>,
    scorer: AnomalyScorer,
    baseline: BaselineBuilder,
    config: AnalyticsConfig,
}

impl BehaviorLedger {
    pub fn new(store: Arc<SqliteStore>, config: AnalyticsConfig) -> Self {
        Self {
            scorer: AnomalyScorer::new(store.clone(), config.clone()),
            baseline: BaselineBuilder::new(store.clone(), config.clone()),
            store,
            config,
        }
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    pub fn baseline_builder(&self) -> &BaselineBuilder {
        &self.baseline
    }

    /// Record one observed action. Returns false (never an error) when the
    /// record could not be written.
    pub fn log_activity(&self, event: &ActivityEvent) -> bool {
        match self.enrich_and_append(event) {
            Ok(record) => {
                debug!(
                    user_id = event.user_id,
                    action = %event.action_type,
                    score = record.anomaly_score,
                    risk = %record.risk_level,
                    "Behavior event recorded"
                );
                true
            }
            Err(e) => {
                warn!(
                    user_id = event.user_id,
                    action = %event.action_type,
                    error = %e,
                    "Failed to record behavior event"
                );
                false
            }
        }
    }

    fn enrich_and_append(&self, event: &ActivityEvent) -> anyhow::Result<BehaviorRecord> {
        let ts = event.timestamp;
        let geo = classify_ip(&event.ip_address);
        let client = parse_user_agent(&event.user_agent);

        // Time since this user's previous record; a long gap means a new
        // session, not one enormous session.
        let session_duration_secs = match self.store.last_event_for_user(event.user_id)? {
            Some(prev) => {
                let gap = ts - prev.timestamp;
                if gap > Duration::hours(self.config.session_gap_hours) || gap < Duration::zero() {
                    0
                } else {
                    gap.num_seconds()
                }
            }
            None => 0,
        };

        let actions_per_minute =
            self.store
                .count_in_window(event.user_id, ts - Duration::seconds(60), ts)?;

        let anomaly_score =
            self.scorer
                .score(event.user_id, &event.ip_address, &event.action_type, ts);
        let reasons =
            self.scorer
                .reasons(event.user_id, &event.ip_address, &event.action_type, ts);

        let is_new_location = !self
            .store
            .has_location(event.user_id, &geo.country, &geo.city)?;
        let is_new_device = !self
            .store
            .has_device(event.user_id, &client.device_type, &client.browser)?;

        let baseline = self.baseline.build(event.user_id, ts);
        let deviation = deviation_from_baseline(&baseline, &event.action_type);

        let record = BehaviorRecord {
            id: 0,
            user_id: event.user_id,
            username: event.username.clone(),
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            action_type: event.action_type.clone(),
            resource_accessed: event.resource_accessed.clone(),
            timestamp: ts,
            session_duration_secs,
            actions_per_minute,
            data_volume_accessed: event.data_volume_accessed,
            country: geo.country,
            city: geo.city,
            device_type: client.device_type,
            browser: client.browser,
            operating_system: client.operating_system,
            is_anomalous: anomaly_score >= self.config.score_medium,
            anomaly_score,
            risk_level: RiskLevel::from_score(
                anomaly_score,
                self.config.score_medium,
                self.config.score_high,
                self.config.score_critical,
            ),
            anomaly_reason: reasons.join(", "),
            is_new_location,
            is_new_device,
            is_off_hours: is_off_hours(
                ts,
                self.config.off_hours_start,
                self.config.off_hours_end,
            ),
            is_high_velocity: actions_per_minute > self.config.high_velocity_per_minute,
            deviation_from_baseline: deviation,
            is_outside_normal_pattern: deviation > 0.7,
            created_at: ts,
        };

        let id = self.store.append_behavior(&record)?;
        Ok(BehaviorRecord { id, ..record })
    }

    /// Delete ledger records older than the retention cutoff. Errors are
    /// logged and reported as zero deletions so a failed sweep never crashes
    /// a scheduler.
    pub fn cleanup_old_records(&self, days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(days);
        match self.store.delete_behavior_older_than(cutoff) {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, days, "Behavior ledger retention sweep complete");
                }
                deleted
            }
            Err(e) => {
                warn!(error = %e, "Behavior ledger retention sweep failed");
                0
            }
        }
    }
}
