use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Threat severity ladder. `Safe` sorts below `Low` so that aggregating by
/// max severity never promotes a whitelisted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatSeverity {
    Safe = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl fmt::Display for ThreatSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatSeverity::Safe => write!(f, "safe"),
            ThreatSeverity::Low => write!(f, "low"),
            ThreatSeverity::Medium => write!(f, "medium"),
            ThreatSeverity::High => write!(f, "high"),
            ThreatSeverity::Critical => write!(f, "critical"),
        }
    }
}

impl ThreatSeverity {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl Default for ThreatSeverity {
    fn default() -> Self {
        Self::Low
    }
}

/// Action recommended to the caller for a given reputation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendedAction {
    Allow,
    Monitor,
    Block,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::Allow => write!(f, "allow"),
            RecommendedAction::Monitor => write!(f, "monitor"),
            RecommendedAction::Block => write!(f, "block"),
        }
    }
}

impl RecommendedAction {
    /// Fixed severity-to-action table: critical/high block, medium is
    /// monitored, everything else passes.
    pub fn for_severity(severity: ThreatSeverity) -> Self {
        match severity {
            ThreatSeverity::Critical | ThreatSeverity::High => Self::Block,
            ThreatSeverity::Medium => Self::Monitor,
            ThreatSeverity::Low | ThreatSeverity::Safe => Self::Allow,
        }
    }
}

/// One threat intelligence record per (ip_address, threat_type) pair.
/// `is_whitelisted` and `is_blacklisted` are mutually exclusive;
/// `confidence_score` and `report_count` only ever increase on repeat
/// sightings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub id: i64,
    pub ip_address: String,
    pub threat_type: String,
    pub severity: ThreatSeverity,
    pub threat_source: String,
    pub description: String,
    /// 0..=100.
    pub confidence_score: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub report_count: i64,
    pub is_active: bool,
    pub is_whitelisted: bool,
    pub is_blacklisted: bool,
    pub country: String,
}

/// Result of a reputation check for a single IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpReputation {
    pub ip_address: String,
    pub is_threat: bool,
    pub threat_level: ThreatSeverity,
    pub threat_types: Vec<String>,
    pub confidence_score: i64,
    pub recommended_action: RecommendedAction,
    pub reasons: Vec<String>,
}
