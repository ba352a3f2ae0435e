use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Four-way risk bucket derived deterministically from an anomaly score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl RiskLevel {
    /// Step function over the anomaly score with configurable cutoffs
    /// (defaults: 0.4 medium, 0.6 high, 0.8 critical).
    pub fn from_score(score: f64, medium: f64, high: f64, critical: f64) -> Self {
        if score >= critical {
            Self::Critical
        } else if score >= high {
            Self::High
        } else if score >= medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

/// One observed user action with its computed tags and final anomaly verdict.
/// Append-only; never updated after the ledger writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub action_type: String,
    pub resource_accessed: String,
    pub timestamp: DateTime<Utc>,
    pub session_duration_secs: i64,
    pub actions_per_minute: i64,
    pub data_volume_accessed: i64,
    pub country: String,
    pub city: String,
    pub device_type: String,
    pub browser: String,
    pub operating_system: String,
    pub is_anomalous: bool,
    pub anomaly_score: f64,
    pub risk_level: RiskLevel,
    pub anomaly_reason: String,
    pub is_new_location: bool,
    pub is_new_device: bool,
    pub is_off_hours: bool,
    pub is_high_velocity: bool,
    pub deviation_from_baseline: f64,
    pub is_outside_normal_pattern: bool,
    pub created_at: DateTime<Utc>,
}

/// A user's empirically typical behavior profile, derived on demand from
/// non-anomalous history. Not persisted as its own row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserBaseline {
    pub user_id: i64,
    /// Top-5 "country, city" strings by frequency.
    pub typical_locations: Vec<String>,
    /// Top-3 "device_type - browser" strings by frequency.
    pub typical_devices: Vec<String>,
    pub typical_session_duration_secs: f64,
    pub typical_actions_per_minute: f64,
    /// Top-5 action types by frequency.
    pub typical_action_types: Vec<String>,
    /// Earliest hour-of-day seen in the window.
    pub active_hours_start: u32,
    /// Latest hour-of-day seen in the window.
    pub active_hours_end: u32,
    pub window_days: i64,
    pub sample_size: usize,
}

/// A fleet-wide named behavioral pattern rolled up from ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorPattern {
    pub name: String,
    pub frequency: usize,
    pub risk_score: f64,
    /// Up to 5 distinct usernames matching the pattern.
    pub affected_users: Vec<String>,
}
