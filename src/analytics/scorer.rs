use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use tracing::{debug, warn};

use crate::config::settings::AnalyticsConfig;
use crate::storage::sqlite::SqliteStore;

/// Score returned for a user with no history at all: we know nothing, so
/// assume moderate risk rather than none.
const NEW_USER_SCORE: f64 = 0.5;

/// Frequency ratio below which an action type or source IP counts as rare
/// for this user.
const RARE_RATIO: f64 = 0.1;

/// Check whether a timestamp falls outside a user's working window:
/// before `start`, after `end`, or on a weekend.
pub fn is_off_hours(ts: DateTime<Utc>, start: u32, end: u32) -> bool {
    let hour = ts.hour();
    let weekday = ts.weekday();
    hour < start || hour > end || weekday == Weekday::Sat || weekday == Weekday::Sun
}

/// Computes a [0, 1] anomaly score for an observed action by comparing it
/// against the user's own trailing history window.
///
/// Scoring and reason extraction are two separately-evolved heuristics that
/// deliberately do not share checks; callers may depend on either path, so
/// they stay independent.
pub struct AnomalyScorer {
    store: Arc<SqliteStore>,
    config: AnalyticsConfig,
}

impl AnomalyScorer {
    pub fn new(store: Arc<SqliteStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    /// Additive penalty model over the trailing window. Empty history scores
    /// the fixed new-user prior. A store failure scores 0.0 (fail open) so
    /// telemetry never blocks the primary request.
    pub fn score(&self, user_id: i64, ip: &str, action_type: &str, ts: DateTime<Utc>) -> f64 {
        let from = ts - Duration::days(self.config.baseline_window_days);
        let history = match self.store.query_by_user(user_id, from, ts) {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id, error = %e, "History lookup failed during scoring; assuming benign");
                return 0.0;
            }
        };

        if history.is_empty() {
            return NEW_USER_SCORE;
        }

        let mut score: f64 = 0.0;
        let total = history.len() as f64;

        // Never-seen time of day.
        let seen_hours: HashSet<u32> = history.iter().map(|r| r.timestamp.hour()).collect();
        if !seen_hours.contains(&ts.hour()) {
            score += 0.3;
        }

        // Rare action type for this user.
        let action_count = history
            .iter()
            .filter(|r| r.action_type == action_type)
            .count();
        if (action_count as f64) / total < RARE_RATIO {
            score += 0.2;
        }

        // New or rare source IP.
        let ip_count = history.iter().filter(|r| r.ip_address == ip).count();
        if (ip_count as f64) / total < RARE_RATIO {
            score += 0.3;
        }

        // Velocity burst in the trailing minute.
        let recent = match self
            .store
            .count_in_window(user_id, ts - Duration::seconds(60), ts)
        {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id, error = %e, "Velocity lookup failed during scoring; assuming benign");
                return 0.0;
            }
        };
        if recent > self.config.velocity_threshold_per_minute {
            score += 0.4;
        }

        let final_score = score.min(1.0);
        debug!(user_id, ip, action_type, score = final_score, "Anomaly score computed");
        final_score
    }

    /// Human-readable reasons for the same tuple, deduplicated. A store
    /// failure degrades to an empty list.
    pub fn reasons(
        &self,
        user_id: i64,
        ip: &str,
        action_type: &str,
        ts: DateTime<Utc>,
    ) -> Vec<String> {
        let from = ts - Duration::days(self.config.baseline_window_days);
        let history = match self.store.query_by_user(user_id, from, ts) {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id, error = %e, "History lookup failed during reason extraction");
                return Vec::new();
            }
        };

        if history.is_empty() {
            return vec!["New user - no historical behavior".to_string()];
        }

        let mut reasons: Vec<String> = Vec::new();
        let total = history.len() as f64;

        let seen_hours: HashSet<u32> = history.iter().map(|r| r.timestamp.hour()).collect();
        if !seen_hours.contains(&ts.hour()) {
            reasons.push("Access at unusual hour of day".to_string());
        }

        if !history.iter().any(|r| r.ip_address == ip) {
            reasons.push("Access from new IP address".to_string());
        }

        // "Common" here uses a >10%-of-total bar, evolved separately from
        // the scoring ratio above.
        let action_count = history
            .iter()
            .filter(|r| r.action_type == action_type)
            .count();
        if (action_count as f64) / total <= RARE_RATIO {
            reasons.push("Unusual action type for this user".to_string());
        }

        let recent = self
            .store
            .count_in_window(user_id, ts - Duration::seconds(60), ts)
            .unwrap_or(0);
        if recent > self.config.velocity_threshold_per_minute {
            reasons.push("High velocity activity".to_string());
        }

        if is_off_hours(ts, self.config.off_hours_start, self.config.off_hours_end) {
            reasons.push("Off-hours access".to_string());
        }

        reasons.dedup();
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use crate::models::behavior::{BehaviorRecord, RiskLevel};
    use chrono::TimeZone;

    fn record(user_id: i64, ip: &str, action: &str, ts: DateTime<Utc>) -> BehaviorRecord {
        BehaviorRecord {
            id: 0,
            user_id,
            username: "alice".to_string(),
            ip_address: ip.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            action_type: action.to_string(),
            resource_accessed: "/api/v1/tasks".to_string(),
            timestamp: ts,
            session_duration_secs: 0,
            actions_per_minute: 1,
            data_volume_accessed: 0,
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
            device_type: "Desktop".to_string(),
            browser: "Chrome".to_string(),
            operating_system: "Windows".to_string(),
            is_anomalous: false,
            anomaly_score: 0.1,
            risk_level: RiskLevel::Low,
            anomaly_reason: String::new(),
            is_new_location: false,
            is_new_device: false,
            is_off_hours: false,
            is_high_velocity: false,
            deviation_from_baseline: 0.1,
            is_outside_normal_pattern: false,
            created_at: ts,
        }
    }

    fn scorer_with_store() -> (AnomalyScorer, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scorer = AnomalyScorer::new(store.clone(), defaults::default_analytics_config());
        (scorer, store)
    }

    // 2026-03-10 is a Tuesday.
    fn tuesday_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_new_user_scores_exactly_half() {
        let (scorer, _store) = scorer_with_store();
        let score = scorer.score(1, "203.0.113.5", "login", tuesday_afternoon());
        assert_eq!(score, 0.5);
    }

    #[test]
    fn test_new_user_reason() {
        let (scorer, _store) = scorer_with_store();
        let reasons = scorer.reasons(1, "203.0.113.5", "login", tuesday_afternoon());
        assert_eq!(reasons, vec!["New user - no historical behavior".to_string()]);
    }

    #[test]
    fn test_established_behavior_scores_low() {
        let (scorer, store) = scorer_with_store();
        let now = tuesday_afternoon();
        // Twenty identical logins at the same hour from the same IP over
        // prior days: nothing about the current action is new.
        for day in 1..=20 {
            store
                .append_behavior(&record(
                    1,
                    "203.0.113.5",
                    "login",
                    now - Duration::days(day),
                ))
                .unwrap();
        }
        let score = scorer.score(1, "203.0.113.5", "login", now);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_penalties_stack_and_cap_at_one() {
        let (scorer, store) = scorer_with_store();
        let now = tuesday_afternoon();
        // History at a different hour, different action, different IP.
        for day in 1..=20 {
            store
                .append_behavior(&record(
                    1,
                    "198.51.100.7",
                    "view_board",
                    (now - Duration::days(day)).with_hour(9).unwrap(),
                ))
                .unwrap();
        }
        // Burst in the last minute to trip the velocity penalty.
        for sec in 1..=12 {
            store
                .append_behavior(&record(
                    1,
                    "198.51.100.7",
                    "view_board",
                    now - Duration::seconds(sec),
                ))
                .unwrap();
        }
        let score = scorer.score(1, "203.0.113.5", "export_data", now);
        // All four penalties fire (0.3 + 0.2 + 0.3 + 0.4 = 1.2), capped.
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_rare_ip_penalty() {
        let (scorer, store) = scorer_with_store();
        let now = tuesday_afternoon();
        for day in 1..=20 {
            store
                .append_behavior(&record(1, "203.0.113.5", "login", now - Duration::days(day)))
                .unwrap();
        }
        let familiar = scorer.score(1, "203.0.113.5", "login", now);
        let unfamiliar = scorer.score(1, "192.0.2.99", "login", now);
        assert_eq!(familiar, 0.0);
        assert!((unfamiliar - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_reasons_flag_new_ip_and_off_hours() {
        let (scorer, store) = scorer_with_store();
        // 2026-03-08 is a Sunday.
        let sunday_night = Utc.with_ymd_and_hms(2026, 3, 8, 22, 0, 0).unwrap();
        for day in 1..=10 {
            store
                .append_behavior(&record(
                    1,
                    "203.0.113.5",
                    "login",
                    sunday_night - Duration::days(day),
                ))
                .unwrap();
        }
        let reasons = scorer.reasons(1, "192.0.2.99", "login", sunday_night);
        assert!(reasons.contains(&"Access from new IP address".to_string()));
        assert!(reasons.contains(&"Off-hours access".to_string()));
        assert!(!reasons.contains(&"Unusual action type for this user".to_string()));
    }

    #[test]
    fn test_is_off_hours() {
        // Tuesday.
        let ts = Utc.with_ymd_and_hms(2026, 3, 10, 7, 0, 0).unwrap();
        assert!(is_off_hours(ts, 8, 18));
        let ts = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        assert!(!is_off_hours(ts, 8, 18));
        let ts = Utc.with_ymd_and_hms(2026, 3, 10, 19, 0, 0).unwrap();
        assert!(is_off_hours(ts, 8, 18));
        // Saturday midday.
        let ts = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        assert!(is_off_hours(ts, 8, 18));
    }
}
