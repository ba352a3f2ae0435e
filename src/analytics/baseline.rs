use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::warn;

use crate::config::settings::AnalyticsConfig;
use crate::models::behavior::{BehaviorRecord, UserBaseline};
use crate::storage::sqlite::SqliteStore;

/// Derives a user's typical behavior profile from non-anomalous history in
/// the trailing window. Recomputed on demand, never persisted.
pub struct BaselineBuilder {
    store: Arc<SqliteStore>,
    config: AnalyticsConfig,
}

impl BaselineBuilder {
    pub fn new(store: Arc<SqliteStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    /// Build the baseline as of `now`. Store failures degrade to an empty
    /// baseline so a telemetry read can never fail a request.
    pub fn build(&self, user_id: i64, now: DateTime<Utc>) -> UserBaseline {
        let from = now - Duration::days(self.config.baseline_window_days);
        let history = match self.store.query_by_user(user_id, from, now) {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id, error = %e, "History lookup failed during baseline build");
                Vec::new()
            }
        };

        let normal: Vec<&BehaviorRecord> =
            history.iter().filter(|r| !r.is_anomalous).collect();

        if normal.is_empty() {
            return UserBaseline {
                user_id,
                window_days: self.config.baseline_window_days,
                ..UserBaseline::default()
            };
        }

        let count = normal.len() as f64;
        let typical_session_duration_secs = normal
            .iter()
            .map(|r| r.session_duration_secs as f64)
            .sum::<f64>()
            / count;
        let typical_actions_per_minute = normal
            .iter()
            .map(|r| r.actions_per_minute as f64)
            .sum::<f64>()
            / count;

        let hours: Vec<u32> = normal.iter().map(|r| r.timestamp.hour()).collect();
        let active_hours_start = hours.iter().copied().min().unwrap_or(0);
        let active_hours_end = hours.iter().copied().max().unwrap_or(0);

        UserBaseline {
            user_id,
            typical_locations: top_by_frequency(
                normal.iter().map(|r| format!("{}, {}", r.country, r.city)),
                5,
            ),
            typical_devices: top_by_frequency(
                normal
                    .iter()
                    .map(|r| format!("{} - {}", r.device_type, r.browser)),
                3,
            ),
            typical_session_duration_secs,
            typical_actions_per_minute,
            typical_action_types: top_by_frequency(
                normal.iter().map(|r| r.action_type.clone()),
                5,
            ),
            active_hours_start,
            active_hours_end,
            window_days: self.config.baseline_window_days,
            sample_size: normal.len(),
        }
    }
}

/// Top-N values by frequency; ties break lexicographically so the result is
/// stable across runs.
fn top_by_frequency<I: Iterator<Item = String>>(values: I, n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked.into_iter().map(|(value, _)| value).collect()
}
