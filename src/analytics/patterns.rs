use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::models::behavior::{BehaviorPattern, BehaviorRecord};
use crate::storage::sqlite::SqliteStore;

/// Window the aggregator rolls up.
const WINDOW_DAYS: i64 = 7;

/// Cap on distinct usernames reported per pattern.
const MAX_AFFECTED_USERS: usize = 5;

/// Rolls the ledger up into named fleet-wide behavioral patterns for
/// dashboards: frequency, a frequency-weighted risk score, and a sample of
/// affected users.
pub struct PatternAggregator {
    store: Arc<SqliteStore>,
}

impl PatternAggregator {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Detect patterns over the trailing 7 days, highest risk first.
    /// Patterns with zero matches are omitted. Store failures degrade to an
    /// empty report.
    pub fn detect(&self, now: DateTime<Utc>) -> Vec<BehaviorPattern> {
        let records = match self.store.query_since(now - Duration::days(WINDOW_DAYS)) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Ledger query failed during pattern aggregation");
                return Vec::new();
            }
        };

        if records.is_empty() {
            return Vec::new();
        }

        let total = records.len() as f64;
        let mut patterns: Vec<BehaviorPattern> = Vec::new();
        patterns.extend(build_pattern(&records, total, "Off-Hours Access", 0.3, |r| {
            r.is_off_hours
        }));
        patterns.extend(build_pattern(&records, total, "New Location Access", 0.4, |r| {
            r.is_new_location
        }));
        patterns.extend(build_pattern(&records, total, "High Velocity Activity", 0.5, |r| {
            r.is_high_velocity
        }));

        patterns.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        patterns
    }
}

fn build_pattern(
    records: &[BehaviorRecord],
    total: f64,
    name: &str,
    base_weight: f64,
    matches: impl Fn(&BehaviorRecord) -> bool,
) -> Option<BehaviorPattern> {
    let matched: Vec<&BehaviorRecord> = records.iter().filter(|r| matches(r)).collect();
    if matched.is_empty() {
        return None;
    }

    let frequency = matched.len();
    let risk_score = ((frequency as f64 / total) * base_weight * 10.0).min(1.0);

    let mut affected_users: Vec<String> = Vec::new();
    for record in &matched {
        if !affected_users.contains(&record.username) {
            affected_users.push(record.username.clone());
            if affected_users.len() >= MAX_AFFECTED_USERS {
                break;
            }
        }
    }

    Some(BehaviorPattern {
        name: name.to_string(),
        frequency,
        risk_score,
        affected_users,
    })
}
