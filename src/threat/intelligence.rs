use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ipnet::IpNet;
use tracing::{debug, info, warn};

use crate::analytics::classifier::{classify_ip, is_local_ip};
use crate::config::settings::ThreatConfig;
use crate::models::threat::{IpReputation, RecommendedAction, ThreatRecord, ThreatSeverity};
use crate::storage::sqlite::SqliteStore;

/// Threat type used for records created by pattern analysis.
const PATTERN_THREAT_TYPE: &str = "suspicious_pattern";

/// Threat type used for records created by manual whitelist/blacklist calls.
const MANUAL_THREAT_TYPE: &str = "manual";

/// Confidence assigned to pattern-analysis findings.
const PATTERN_CONFIDENCE: i64 = 60;

/// Confidence assigned to known-bad prefix hits.
const BAD_PREFIX_CONFIDENCE: i64 = 85;

/// Confidence floor reported for addresses with no signal at all.
const BENIGN_CONFIDENCE: i64 = 10;

/// IP reputation engine: confidence-scored threat records keyed by
/// (ip, threat_type), per-IP whitelist/blacklist flags, and a heuristic
/// pattern analyzer whose findings reinforce themselves on repeat sightings.
pub struct ThreatIntelligence {
    store: Arc<SqliteStore>,
    bad_prefixes: Vec<IpNet>,
    retention_days: i64,
}

impl ThreatIntelligence {
    pub fn new(store: Arc<SqliteStore>, config: &ThreatConfig) -> Self {
        let mut bad_prefixes = Vec::new();
        for prefix in &config.bad_prefixes {
            match prefix.parse::<IpNet>() {
                Ok(net) => bad_prefixes.push(net),
                Err(e) => warn!(prefix = %prefix, error = %e, "Ignoring unparseable bad prefix"),
            }
        }
        info!(
            bad_prefixes = bad_prefixes.len(),
            retention_days = config.retention_days,
            "Threat intelligence engine initialized"
        );
        Self {
            store,
            bad_prefixes,
            retention_days: config.retention_days,
        }
    }

    /// Check the reputation of an IP. The whitelist always wins, even over
    /// active threat records or a blacklist flag; known records come next;
    /// otherwise pattern analysis runs and persists anything suspicious it
    /// finds. A store failure degrades to the benign default.
    pub fn check_ip_reputation(&self, ip: &str, now: DateTime<Utc>) -> IpReputation {
        let records = match self.store.get_threats_by_ip(ip) {
            Ok(records) => records,
            Err(e) => {
                warn!(ip, error = %e, "Threat lookup failed; assuming benign");
                return benign(ip);
            }
        };

        if records.iter().any(|r| r.is_whitelisted) {
            return IpReputation {
                ip_address: ip.to_string(),
                is_threat: false,
                threat_level: ThreatSeverity::Safe,
                threat_types: Vec::new(),
                confidence_score: 100,
                recommended_action: RecommendedAction::Allow,
                reasons: vec!["IP is whitelisted".to_string()],
            };
        }

        let active: Vec<&ThreatRecord> = records.iter().filter(|r| r.is_active).collect();
        if !active.is_empty() {
            let severity = active
                .iter()
                .map(|r| r.severity)
                .max()
                .unwrap_or_default();
            let confidence = active.iter().map(|r| r.confidence_score).max().unwrap_or(0);
            let mut threat_types: Vec<String> = Vec::new();
            let mut reasons: Vec<String> = Vec::new();
            for record in &active {
                if !threat_types.contains(&record.threat_type) {
                    threat_types.push(record.threat_type.clone());
                }
                if !record.description.is_empty() {
                    reasons.push(record.description.clone());
                }
            }
            debug!(ip, severity = %severity, confidence, "Known threat record hit");
            return IpReputation {
                ip_address: ip.to_string(),
                is_threat: true,
                threat_level: severity,
                threat_types,
                confidence_score: confidence,
                recommended_action: RecommendedAction::for_severity(severity),
                reasons,
            };
        }

        let (severity, confidence, reasons) = self.analyze_patterns(ip);
        if severity > ThreatSeverity::Low {
            // Self-reinforcing: repeated sightings of the same suspicious
            // pattern raise report_count and confidence.
            self.add_threat_intelligence(
                ip,
                PATTERN_THREAT_TYPE,
                severity,
                "pattern_analysis",
                &reasons.join(", "),
                confidence,
                now,
            );
            return IpReputation {
                ip_address: ip.to_string(),
                is_threat: true,
                threat_level: severity,
                threat_types: vec![PATTERN_THREAT_TYPE.to_string()],
                confidence_score: confidence,
                recommended_action: RecommendedAction::for_severity(severity),
                reasons,
            };
        }

        benign(ip)
    }

    /// Heuristic checks against the raw address string. Intentionally
    /// IPv4-centric: the malformed-address checks operate on the literal
    /// text, and valid addresses that merely look odd fall through to the
    /// benign default.
    fn analyze_patterns(&self, ip: &str) -> (ThreatSeverity, i64, Vec<String>) {
        if let Ok(parsed) = ip.parse::<IpAddr>() {
            if self.bad_prefixes.iter().any(|net| net.contains(&parsed)) {
                return (
                    ThreatSeverity::High,
                    BAD_PREFIX_CONFIDENCE,
                    vec!["Address in known-bad prefix".to_string()],
                );
            }
            if is_local_ip(parsed) {
                return (
                    ThreatSeverity::Medium,
                    PATTERN_CONFIDENCE,
                    vec!["Private or local address range".to_string()],
                );
            }
        }

        if ip.contains("..") || ip.len() > 15 {
            return (
                ThreatSeverity::Medium,
                PATTERN_CONFIDENCE,
                vec!["Malformed-looking address".to_string()],
            );
        }

        (ThreatSeverity::Low, BENIGN_CONFIDENCE, Vec::new())
    }

    /// Upsert a threat record keyed by (ip, threat_type). A repeat sighting
    /// bumps last_seen and report_count, raises confidence monotonically,
    /// and reactivates the record. Returns false on store failure.
    #[allow(clippy::too_many_arguments)]
    pub fn add_threat_intelligence(
        &self,
        ip: &str,
        threat_type: &str,
        severity: ThreatSeverity,
        source: &str,
        description: &str,
        confidence: i64,
        now: DateTime<Utc>,
    ) -> bool {
        let confidence = confidence.clamp(0, 100);
        let result = match self.store.get_threat_by_ip_and_type(ip, threat_type) {
            Ok(Some(_)) => self
                .store
                .record_sighting(ip, threat_type, confidence, now)
                .map(|_| ()),
            Ok(None) => self
                .store
                .insert_threat(&ThreatRecord {
                    id: 0,
                    ip_address: ip.to_string(),
                    threat_type: threat_type.to_string(),
                    severity,
                    threat_source: source.to_string(),
                    description: description.to_string(),
                    confidence_score: confidence,
                    first_seen: now,
                    last_seen: now,
                    report_count: 1,
                    is_active: true,
                    is_whitelisted: false,
                    is_blacklisted: false,
                    country: classify_ip(ip).country,
                })
                .map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(ip, threat_type, error = %e, "Failed to record threat intelligence");
                false
            }
        }
    }

    /// Whitelist an IP. Idempotent; clears any blacklist flag on every
    /// record for the IP, creating a record when none exists.
    pub fn whitelist_ip(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.set_flags(ip, true, false, ThreatSeverity::Safe, "Whitelisted by operator", now)
    }

    /// Blacklist an IP. Idempotent; clears any whitelist flag on every
    /// record for the IP, creating a record when none exists.
    pub fn blacklist_ip(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.set_flags(ip, false, true, ThreatSeverity::Critical, "Blacklisted by operator", now)
    }

    fn set_flags(
        &self,
        ip: &str,
        whitelisted: bool,
        blacklisted: bool,
        severity: ThreatSeverity,
        description: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.apply_flags(ip, whitelisted, blacklisted, severity, description, now) {
            Ok(()) => {
                info!(ip, whitelisted, blacklisted, "IP list flags updated");
                true
            }
            Err(e) => {
                warn!(ip, error = %e, "Failed to update IP list flags");
                false
            }
        }
    }

    fn apply_flags(
        &self,
        ip: &str,
        whitelisted: bool,
        blacklisted: bool,
        severity: ThreatSeverity,
        description: &str,
        now: DateTime<Utc>,
    ) -> rusqlite::Result<()> {
        match self.store.get_threat_by_ip_and_type(ip, MANUAL_THREAT_TYPE)? {
            // A manual row left behind by an earlier whitelist carries Safe
            // severity and is inactive; a blacklist must supersede it or the
            // reputation check would report the IP harmless.
            Some(existing) if blacklisted && existing.severity < severity => {
                self.store
                    .update_threat_verdict(ip, MANUAL_THREAT_TYPE, severity, description, now)?;
            }
            Some(_) => {}
            None => {
                let records = self.store.get_threats_by_ip(ip)?;
                // A blacklist always gets its own Critical record; a
                // whitelist only needs some row to carry the flag.
                if blacklisted || records.is_empty() {
                    self.store.insert_threat(&ThreatRecord {
                        id: 0,
                        ip_address: ip.to_string(),
                        threat_type: MANUAL_THREAT_TYPE.to_string(),
                        severity,
                        threat_source: "manual".to_string(),
                        description: description.to_string(),
                        confidence_score: 100,
                        first_seen: now,
                        last_seen: now,
                        report_count: 1,
                        // Blacklist entries stay active so reputation checks
                        // hit them; whitelist entries only carry the flag.
                        is_active: blacklisted,
                        is_whitelisted: false,
                        is_blacklisted: false,
                        country: classify_ip(ip).country,
                    })?;
                }
            }
        }
        self.store.set_ip_flags(ip, whitelisted, blacklisted)?;
        Ok(())
    }

    pub fn active_threats(&self) -> Vec<ThreatRecord> {
        self.store.list_active_threats().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list active threats");
            Vec::new()
        })
    }

    pub fn threats_by_type(&self, threat_type: &str) -> Vec<ThreatRecord> {
        self.store
            .list_threats_by_type(threat_type)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to list threats by type");
                Vec::new()
            })
    }

    pub fn threats_by_severity(&self, severity: ThreatSeverity) -> Vec<ThreatRecord> {
        self.store
            .list_threats_by_severity(severity)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to list threats by severity");
                Vec::new()
            })
    }

    /// Remove records whose last sighting is older than `days_old`;
    /// blacklisted and whitelisted records are retained. Errors log and
    /// report zero so a failed sweep never crashes a scheduler.
    pub fn cleanup_old_threats(&self, days_old: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(days_old);
        match self.store.delete_threats_older_than(cutoff) {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, days_old, "Threat retention sweep complete");
                }
                deleted
            }
            Err(e) => {
                warn!(error = %e, "Threat retention sweep failed");
                0
            }
        }
    }

    /// Configured retention window, used by the sweeper.
    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }
}

fn benign(ip: &str) -> IpReputation {
    IpReputation {
        ip_address: ip.to_string(),
        is_threat: false,
        threat_level: ThreatSeverity::Low,
        threat_types: Vec::new(),
        confidence_score: BENIGN_CONFIDENCE,
        recommended_action: RecommendedAction::Allow,
        reasons: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults;
    use chrono::TimeZone;

    fn engine() -> ThreatIntelligence {
        crate::init_test_logging();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        ThreatIntelligence::new(store, &defaults::default_threat_config())
    }

    fn engine_with_prefixes(prefixes: &[&str]) -> ThreatIntelligence {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut config = defaults::default_threat_config();
        config.bad_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        ThreatIntelligence::new(store, &config)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_public_ip_is_benign() {
        let engine = engine();
        let rep = engine.check_ip_reputation("203.0.113.5", now());
        assert!(!rep.is_threat);
        assert_eq!(rep.threat_level, ThreatSeverity::Low);
        assert_eq!(rep.recommended_action, RecommendedAction::Allow);
        assert_eq!(rep.confidence_score, 10);
    }

    #[test]
    fn test_known_threat_drives_action_table() {
        let engine = engine();
        assert!(engine.add_threat_intelligence(
            "198.51.100.7",
            "brute_force",
            ThreatSeverity::High,
            "auth_service",
            "Repeated failed logins",
            90,
            now(),
        ));
        let rep = engine.check_ip_reputation("198.51.100.7", now());
        assert!(rep.is_threat);
        assert_eq!(rep.threat_level, ThreatSeverity::High);
        assert_eq!(rep.recommended_action, RecommendedAction::Block);
        assert_eq!(rep.threat_types, vec!["brute_force".to_string()]);
        assert_eq!(rep.confidence_score, 90);
    }

    #[test]
    fn test_repeat_sighting_increments_and_never_decreases_confidence() {
        let engine = engine();
        let ts = now();
        engine.add_threat_intelligence(
            "198.51.100.7",
            "scanner",
            ThreatSeverity::Medium,
            "ids",
            "Port scan",
            70,
            ts,
        );
        // Second sighting with lower confidence.
        engine.add_threat_intelligence(
            "198.51.100.7",
            "scanner",
            ThreatSeverity::Medium,
            "ids",
            "Port scan",
            40,
            ts + Duration::hours(1),
        );
        // Third sighting with higher confidence.
        engine.add_threat_intelligence(
            "198.51.100.7",
            "scanner",
            ThreatSeverity::Medium,
            "ids",
            "Port scan",
            80,
            ts + Duration::hours(2),
        );

        let record = engine
            .store
            .get_threat_by_ip_and_type("198.51.100.7", "scanner")
            .unwrap()
            .unwrap();
        assert_eq!(record.report_count, 3);
        assert_eq!(record.confidence_score, 80);
        assert_eq!(record.last_seen, ts + Duration::hours(2));
        assert_eq!(record.first_seen, ts);
        assert!(record.is_active);
    }

    #[test]
    fn test_whitelist_wins_over_blacklist_and_active_threats() {
        let engine = engine();
        let ts = now();
        engine.add_threat_intelligence(
            "198.51.100.7",
            "ddos",
            ThreatSeverity::Critical,
            "ids",
            "Flood source",
            95,
            ts,
        );
        assert!(engine.blacklist_ip("198.51.100.7", ts));
        assert!(engine.whitelist_ip("198.51.100.7", ts));

        let rep = engine.check_ip_reputation("198.51.100.7", ts);
        assert!(!rep.is_threat);
        assert_eq!(rep.confidence_score, 100);
        assert_eq!(rep.threat_level, ThreatSeverity::Safe);
        assert_eq!(rep.recommended_action, RecommendedAction::Allow);

        // Flags are mutually exclusive on every record for the IP.
        for record in engine.store.get_threats_by_ip("198.51.100.7").unwrap() {
            assert!(record.is_whitelisted);
            assert!(!record.is_blacklisted);
        }
    }

    #[test]
    fn test_blacklist_blocks() {
        let engine = engine();
        let ts = now();
        assert!(engine.blacklist_ip("198.51.100.7", ts));
        let rep = engine.check_ip_reputation("198.51.100.7", ts);
        assert!(rep.is_threat);
        assert_eq!(rep.recommended_action, RecommendedAction::Block);
    }

    #[test]
    fn test_blacklist_supersedes_earlier_whitelist() {
        let engine = engine();
        let ts = now();
        assert!(engine.whitelist_ip("198.51.100.7", ts));
        assert!(engine.blacklist_ip("198.51.100.7", ts + Duration::hours(1)));

        let rep = engine.check_ip_reputation("198.51.100.7", ts + Duration::hours(1));
        assert!(rep.is_threat);
        assert_eq!(rep.threat_level, ThreatSeverity::Critical);
        assert_eq!(rep.recommended_action, RecommendedAction::Block);

        // The manual row the whitelist created was escalated, not shadowed.
        let record = engine
            .store
            .get_threat_by_ip_and_type("198.51.100.7", "manual")
            .unwrap()
            .unwrap();
        assert!(record.is_active);
        assert!(record.is_blacklisted);
        assert!(!record.is_whitelisted);
        assert_eq!(record.severity, ThreatSeverity::Critical);
    }

    #[test]
    fn test_private_range_flagged_and_self_reinforcing() {
        let engine = engine();
        let ts = now();
        let rep = engine.check_ip_reputation("192.168.1.10", ts);
        assert!(rep.is_threat);
        assert_eq!(rep.threat_level, ThreatSeverity::Medium);
        assert_eq!(rep.recommended_action, RecommendedAction::Monitor);
        assert_eq!(rep.confidence_score, 60);

        // The finding was persisted as a suspicious_pattern record, and a
        // later check now hits the exact-match path instead of re-running
        // the analysis.
        let record = engine
            .store
            .get_threat_by_ip_and_type("192.168.1.10", "suspicious_pattern")
            .unwrap()
            .unwrap();
        assert_eq!(record.report_count, 1);
        assert!(record.is_active);

        let rep = engine.check_ip_reputation("192.168.1.10", ts + Duration::hours(1));
        assert!(rep.is_threat);
        assert_eq!(rep.threat_types, vec!["suspicious_pattern".to_string()]);
    }

    #[test]
    fn test_malformed_addresses_flagged() {
        let engine = engine();
        let rep = engine.check_ip_reputation("10..0.0.1", now());
        assert!(rep.is_threat);
        assert_eq!(rep.threat_level, ThreatSeverity::Medium);

        let rep = engine.check_ip_reputation("203.0.113.5.extra.junk", now());
        assert!(rep.is_threat);
    }

    #[test]
    fn test_bad_prefix_flagged_high() {
        let engine = engine_with_prefixes(&["185.220.100.0/22"]);
        let rep = engine.check_ip_reputation("185.220.101.44", now());
        assert!(rep.is_threat);
        assert_eq!(rep.threat_level, ThreatSeverity::High);
        assert_eq!(rep.recommended_action, RecommendedAction::Block);
        assert_eq!(rep.confidence_score, 85);
    }

    #[test]
    fn test_cleanup_retains_listed_records() {
        let engine = engine();
        let ts = now();
        let old = ts - Duration::days(100);
        engine.add_threat_intelligence(
            "198.51.100.1",
            "scanner",
            ThreatSeverity::Medium,
            "ids",
            "",
            50,
            old,
        );
        engine.add_threat_intelligence(
            "198.51.100.2",
            "scanner",
            ThreatSeverity::Medium,
            "ids",
            "",
            50,
            old,
        );
        assert!(engine.blacklist_ip("198.51.100.2", old));

        let removed = engine.cleanup_old_threats(90, ts);
        assert_eq!(removed, 1);
        assert!(engine
            .store
            .get_threat_by_ip_and_type("198.51.100.1", "scanner")
            .unwrap()
            .is_none());
        assert!(engine
            .store
            .get_threat_by_ip_and_type("198.51.100.2", "scanner")
            .unwrap()
            .is_some());
    }
}
