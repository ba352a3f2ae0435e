use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};

use crate::models::behavior::{BehaviorRecord, RiskLevel};
use crate::models::quota::{RateLimitRule, SubscriptionTier, UserQuota};
use crate::models::threat::{ThreatRecord, ThreatSeverity};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way every table stores it.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a stored timestamp. Malformed values collapse to the epoch so a
/// single corrupt row cannot poison a whole range query.
pub fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS behavior_events (
                id                        INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id                   INTEGER NOT NULL,
                username                  TEXT NOT NULL,
                ip_address                TEXT NOT NULL,
                user_agent                TEXT NOT NULL DEFAULT '',
                action_type               TEXT NOT NULL,
                resource_accessed         TEXT NOT NULL DEFAULT '',
                timestamp                 TEXT NOT NULL,
                session_duration_secs     INTEGER NOT NULL DEFAULT 0,
                actions_per_minute        INTEGER NOT NULL DEFAULT 0,
                data_volume_accessed      INTEGER NOT NULL DEFAULT 0,
                country                   TEXT NOT NULL DEFAULT 'Unknown',
                city                      TEXT NOT NULL DEFAULT 'Unknown',
                device_type               TEXT NOT NULL DEFAULT 'Desktop',
                browser                   TEXT NOT NULL DEFAULT 'Unknown',
                operating_system          TEXT NOT NULL DEFAULT 'Unknown',
                is_anomalous              INTEGER NOT NULL DEFAULT 0,
                anomaly_score             REAL NOT NULL DEFAULT 0,
                risk_level                TEXT NOT NULL DEFAULT 'low',
                anomaly_reason            TEXT NOT NULL DEFAULT '',
                is_new_location           INTEGER NOT NULL DEFAULT 0,
                is_new_device             INTEGER NOT NULL DEFAULT 0,
                is_off_hours              INTEGER NOT NULL DEFAULT 0,
                is_high_velocity          INTEGER NOT NULL DEFAULT 0,
                deviation_from_baseline   REAL NOT NULL DEFAULT 0,
                is_outside_normal_pattern INTEGER NOT NULL DEFAULT 0,
                created_at                TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_behavior_user_ts
                ON behavior_events (user_id, timestamp);

            CREATE TABLE IF NOT EXISTS threat_records (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                ip_address       TEXT NOT NULL,
                threat_type      TEXT NOT NULL,
                severity         TEXT NOT NULL DEFAULT 'low',
                threat_source    TEXT NOT NULL DEFAULT '',
                description      TEXT NOT NULL DEFAULT '',
                confidence_score INTEGER NOT NULL DEFAULT 0,
                first_seen       TEXT NOT NULL,
                last_seen        TEXT NOT NULL,
                report_count     INTEGER NOT NULL DEFAULT 1,
                is_active        INTEGER NOT NULL DEFAULT 1,
                is_whitelisted   INTEGER NOT NULL DEFAULT 0,
                is_blacklisted   INTEGER NOT NULL DEFAULT 0,
                country          TEXT NOT NULL DEFAULT 'Unknown',
                UNIQUE(ip_address, threat_type)
            );

            CREATE TABLE IF NOT EXISTS subscription_tiers (
                id                          INTEGER PRIMARY KEY,
                name                        TEXT NOT NULL UNIQUE,
                is_system_tier              INTEGER NOT NULL DEFAULT 0,
                bypass_standard_rate_limits INTEGER NOT NULL DEFAULT 0,
                daily_api_quota             INTEGER NOT NULL DEFAULT 1000,
                default_rate_limit          INTEGER NOT NULL DEFAULT 60,
                default_time_window_secs    INTEGER NOT NULL DEFAULT 60
            );

            CREATE TABLE IF NOT EXISTS rate_limit_rules (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                subscription_tier_id INTEGER NOT NULL,
                endpoint_pattern     TEXT NOT NULL,
                rate_limit           INTEGER NOT NULL,
                time_window_secs     INTEGER NOT NULL DEFAULT 60,
                match_priority       INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_rules_tier
                ON rate_limit_rules (subscription_tier_id, match_priority);

            CREATE TABLE IF NOT EXISTS user_quotas (
                user_id                     INTEGER PRIMARY KEY,
                subscription_tier_id        INTEGER NOT NULL,
                api_calls_used_today        INTEGER NOT NULL DEFAULT 0,
                max_daily_api_calls         INTEGER NOT NULL DEFAULT 1000,
                last_reset                  TEXT NOT NULL,
                last_updated                TEXT NOT NULL,
                is_exempt_from_quota        INTEGER NOT NULL DEFAULT 0,
                has_received_quota_warning  INTEGER NOT NULL DEFAULT 0
            );
            ",
        )
    }

    // -----------------------------------------------------------------------
    // Behavior events
    // -----------------------------------------------------------------------

    pub fn append_behavior(&self, record: &BehaviorRecord) -> Result<i64> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO behavior_events
             (user_id, username, ip_address, user_agent, action_type, resource_accessed,
              timestamp, session_duration_secs, actions_per_minute, data_volume_accessed,
              country, city, device_type, browser, operating_system,
              is_anomalous, anomaly_score, risk_level, anomaly_reason,
              is_new_location, is_new_device, is_off_hours, is_high_velocity,
              deviation_from_baseline, is_outside_normal_pattern, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                record.user_id,
                record.username,
                record.ip_address,
                record.user_agent,
                record.action_type,
                record.resource_accessed,
                format_ts(record.timestamp),
                record.session_duration_secs,
                record.actions_per_minute,
                record.data_volume_accessed,
                record.country,
                record.city,
                record.device_type,
                record.browser,
                record.operating_system,
                record.is_anomalous as i32,
                record.anomaly_score,
                record.risk_level.to_string(),
                record.anomaly_reason,
                record.is_new_location as i32,
                record.is_new_device as i32,
                record.is_off_hours as i32,
                record.is_high_velocity as i32,
                record.deviation_from_baseline,
                record.is_outside_normal_pattern as i32,
                format_ts(record.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn query_by_user(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BehaviorRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events
             WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp ASC",
            BEHAVIOR_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![user_id, format_ts(from), format_ts(to)],
            behavior_from_row,
        )?;
        rows.collect()
    }

    pub fn query_by_user_and_ip(
        &self,
        user_id: i64,
        ip: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BehaviorRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events
             WHERE user_id = ?1 AND ip_address = ?2 AND timestamp >= ?3 AND timestamp < ?4
             ORDER BY timestamp ASC",
            BEHAVIOR_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![user_id, ip, format_ts(from), format_ts(to)],
            behavior_from_row,
        )?;
        rows.collect()
    }

    pub fn count_in_window(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.query_row(
            "SELECT COUNT(*) FROM behavior_events
             WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp < ?3",
            params![user_id, format_ts(from), format_ts(to)],
            |row| row.get(0),
        )
    }

    pub fn last_event_for_user(&self, user_id: i64) -> Result<Option<BehaviorRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events
             WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
            BEHAVIOR_COLUMNS
        ))?;
        stmt.query_row(params![user_id], behavior_from_row).optional()
    }

    /// Unbounded existence check: has this user ever been seen at this
    /// country+city?
    pub fn has_location(&self, user_id: i64, country: &str, city: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM behavior_events
             WHERE user_id = ?1 AND country = ?2 AND city = ?3",
            params![user_id, country, city],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Unbounded existence check: has this user ever used this
    /// device_type+browser pair?
    pub fn has_device(&self, user_id: i64, device_type: &str, browser: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM behavior_events
             WHERE user_id = ?1 AND device_type = ?2 AND browser = ?3",
            params![user_id, device_type, browser],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fleet-wide query used by the pattern aggregator.
    pub fn query_since(&self, from: DateTime<Utc>) -> Result<Vec<BehaviorRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events WHERE timestamp >= ?1 ORDER BY timestamp ASC",
            BEHAVIOR_COLUMNS
        ))?;
        let rows = stmt.query_map(params![format_ts(from)], behavior_from_row)?;
        rows.collect()
    }

    pub fn delete_behavior_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "DELETE FROM behavior_events WHERE timestamp < ?1",
            params![format_ts(cutoff)],
        )
    }

    // -----------------------------------------------------------------------
    // Threat records
    // -----------------------------------------------------------------------

    pub fn get_threats_by_ip(&self, ip: &str) -> Result<Vec<ThreatRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM threat_records WHERE ip_address = ?1",
            THREAT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![ip], threat_from_row)?;
        rows.collect()
    }

    pub fn get_threat_by_ip_and_type(
        &self,
        ip: &str,
        threat_type: &str,
    ) -> Result<Option<ThreatRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM threat_records WHERE ip_address = ?1 AND threat_type = ?2",
            THREAT_COLUMNS
        ))?;
        stmt.query_row(params![ip, threat_type], threat_from_row)
            .optional()
    }

    pub fn insert_threat(&self, record: &ThreatRecord) -> Result<i64> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO threat_records
             (ip_address, threat_type, severity, threat_source, description,
              confidence_score, first_seen, last_seen, report_count,
              is_active, is_whitelisted, is_blacklisted, country)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.ip_address,
                record.threat_type,
                record.severity.to_string(),
                record.threat_source,
                record.description,
                record.confidence_score,
                format_ts(record.first_seen),
                format_ts(record.last_seen),
                record.report_count,
                record.is_active as i32,
                record.is_whitelisted as i32,
                record.is_blacklisted as i32,
                record.country,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Repeat-sighting update: bump last_seen and report_count, raise
    /// confidence monotonically, reactivate. Runs as a single UPDATE so the
    /// monotonicity holds even under interleaved callers.
    pub fn record_sighting(
        &self,
        ip: &str,
        threat_type: &str,
        confidence: i64,
        last_seen: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "UPDATE threat_records
             SET last_seen = ?1,
                 report_count = report_count + 1,
                 confidence_score = MAX(confidence_score, ?2),
                 is_active = 1
             WHERE ip_address = ?3 AND threat_type = ?4",
            params![format_ts(last_seen), confidence, ip, threat_type],
        )
    }

    /// Replace the verdict on one (ip, type) row: severity, description,
    /// last_seen, and reactivate.
    pub fn update_threat_verdict(
        &self,
        ip: &str,
        threat_type: &str,
        severity: ThreatSeverity,
        description: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "UPDATE threat_records
             SET severity = ?1, description = ?2, last_seen = ?3, is_active = 1
             WHERE ip_address = ?4 AND threat_type = ?5",
            params![
                severity.to_string(),
                description,
                format_ts(last_seen),
                ip,
                threat_type
            ],
        )
    }

    /// Flip whitelist/blacklist flags on every record for an IP. The flags
    /// are per-IP semantics stored on per-(ip, type) rows. Blacklisting
    /// reactivates the rows so reputation checks see them again even after a
    /// prior whitelist deactivated everything.
    pub fn set_ip_flags(&self, ip: &str, whitelisted: bool, blacklisted: bool) -> Result<usize> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "UPDATE threat_records
             SET is_whitelisted = ?1,
                 is_blacklisted = ?2,
                 is_active = CASE WHEN ?2 THEN 1 ELSE is_active END
             WHERE ip_address = ?3",
            params![whitelisted as i32, blacklisted as i32, ip],
        )
    }

    pub fn list_active_threats(&self) -> Result<Vec<ThreatRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM threat_records WHERE is_active = 1 ORDER BY last_seen DESC",
            THREAT_COLUMNS
        ))?;
        let rows = stmt.query_map([], threat_from_row)?;
        rows.collect()
    }

    pub fn list_threats_by_type(&self, threat_type: &str) -> Result<Vec<ThreatRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM threat_records WHERE threat_type = ?1 ORDER BY last_seen DESC",
            THREAT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![threat_type], threat_from_row)?;
        rows.collect()
    }

    pub fn list_threats_by_severity(&self, severity: ThreatSeverity) -> Result<Vec<ThreatRecord>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM threat_records WHERE severity = ?1 ORDER BY last_seen DESC",
            THREAT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![severity.to_string()], threat_from_row)?;
        rows.collect()
    }

    /// Age out stale threat records; blacklisted and whitelisted records are
    /// always retained.
    pub fn delete_threats_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "DELETE FROM threat_records
             WHERE last_seen < ?1 AND is_blacklisted = 0 AND is_whitelisted = 0",
            params![format_ts(cutoff)],
        )
    }

    // -----------------------------------------------------------------------
    // Tiers, rules, quotas
    // -----------------------------------------------------------------------

    pub fn upsert_tier(&self, tier: &SubscriptionTier) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO subscription_tiers
             (id, name, is_system_tier, bypass_standard_rate_limits,
              daily_api_quota, default_rate_limit, default_time_window_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tier.id,
                tier.name,
                tier.is_system_tier as i32,
                tier.bypass_standard_rate_limits as i32,
                tier.daily_api_quota,
                tier.default_rate_limit,
                tier.default_time_window_secs,
            ],
        )?;
        Ok(())
    }

    pub fn get_tier_by_id(&self, id: i64) -> Result<Option<SubscriptionTier>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscription_tiers WHERE id = ?1",
            TIER_COLUMNS
        ))?;
        stmt.query_row(params![id], tier_from_row).optional()
    }

    pub fn get_tier_by_name(&self, name: &str) -> Result<Option<SubscriptionTier>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscription_tiers WHERE name = ?1",
            TIER_COLUMNS
        ))?;
        stmt.query_row(params![name], tier_from_row).optional()
    }

    pub fn add_rule(&self, rule: &RateLimitRule) -> Result<i64> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO rate_limit_rules
             (subscription_tier_id, endpoint_pattern, rate_limit, time_window_secs, match_priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rule.subscription_tier_id,
                rule.endpoint_pattern,
                rule.rate_limit,
                rule.time_window_secs,
                rule.match_priority,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Rules for a tier, highest match_priority first.
    pub fn list_rules(&self, tier_id: i64) -> Result<Vec<RateLimitRule>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, subscription_tier_id, endpoint_pattern, rate_limit,
                    time_window_secs, match_priority
             FROM rate_limit_rules WHERE subscription_tier_id = ?1
             ORDER BY match_priority DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![tier_id], |row| {
            Ok(RateLimitRule {
                id: row.get(0)?,
                subscription_tier_id: row.get(1)?,
                endpoint_pattern: row.get(2)?,
                rate_limit: row.get(3)?,
                time_window_secs: row.get(4)?,
                match_priority: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    pub fn get_user_quota(&self, user_id: i64) -> Result<Option<UserQuota>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT user_id, subscription_tier_id, api_calls_used_today, max_daily_api_calls,
                    last_reset, last_updated, is_exempt_from_quota, has_received_quota_warning
             FROM user_quotas WHERE user_id = ?1",
        )?;
        stmt.query_row(params![user_id], quota_from_row).optional()
    }

    pub fn upsert_user_quota(&self, quota: &UserQuota) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO user_quotas
             (user_id, subscription_tier_id, api_calls_used_today, max_daily_api_calls,
              last_reset, last_updated, is_exempt_from_quota, has_received_quota_warning)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                subscription_tier_id = excluded.subscription_tier_id,
                api_calls_used_today = excluded.api_calls_used_today,
                max_daily_api_calls = excluded.max_daily_api_calls,
                last_reset = excluded.last_reset,
                last_updated = excluded.last_updated,
                is_exempt_from_quota = excluded.is_exempt_from_quota,
                has_received_quota_warning = excluded.has_received_quota_warning",
            params![
                quota.user_id,
                quota.subscription_tier_id,
                quota.api_calls_used_today,
                quota.max_daily_api_calls,
                format_ts(quota.last_reset),
                format_ts(quota.last_updated),
                quota.is_exempt_from_quota as i32,
                quota.has_received_quota_warning as i32,
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const BEHAVIOR_COLUMNS: &str = "id, user_id, username, ip_address, user_agent, action_type, \
     resource_accessed, timestamp, session_duration_secs, actions_per_minute, \
     data_volume_accessed, country, city, device_type, browser, operating_system, \
     is_anomalous, anomaly_score, risk_level, anomaly_reason, is_new_location, \
     is_new_device, is_off_hours, is_high_velocity, deviation_from_baseline, \
     is_outside_normal_pattern, created_at";

const THREAT_COLUMNS: &str = "id, ip_address, threat_type, severity, threat_source, description, \
     confidence_score, first_seen, last_seen, report_count, is_active, \
     is_whitelisted, is_blacklisted, country";

const TIER_COLUMNS: &str = "id, name, is_system_tier, bypass_standard_rate_limits, \
     daily_api_quota, default_rate_limit, default_time_window_secs";

fn behavior_from_row(row: &Row<'_>) -> Result<BehaviorRecord> {
    Ok(BehaviorRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        ip_address: row.get(3)?,
        user_agent: row.get(4)?,
        action_type: row.get(5)?,
        resource_accessed: row.get(6)?,
        timestamp: parse_ts(&row.get::<_, String>(7)?),
        session_duration_secs: row.get(8)?,
        actions_per_minute: row.get(9)?,
        data_volume_accessed: row.get(10)?,
        country: row.get(11)?,
        city: row.get(12)?,
        device_type: row.get(13)?,
        browser: row.get(14)?,
        operating_system: row.get(15)?,
        is_anomalous: row.get::<_, i32>(16)? != 0,
        anomaly_score: row.get(17)?,
        risk_level: RiskLevel::from_str_name(&row.get::<_, String>(18)?).unwrap_or_default(),
        anomaly_reason: row.get(19)?,
        is_new_location: row.get::<_, i32>(20)? != 0,
        is_new_device: row.get::<_, i32>(21)? != 0,
        is_off_hours: row.get::<_, i32>(22)? != 0,
        is_high_velocity: row.get::<_, i32>(23)? != 0,
        deviation_from_baseline: row.get(24)?,
        is_outside_normal_pattern: row.get::<_, i32>(25)? != 0,
        created_at: parse_ts(&row.get::<_, String>(26)?),
    })
}

fn threat_from_row(row: &Row<'_>) -> Result<ThreatRecord> {
    Ok(ThreatRecord {
        id: row.get(0)?,
        ip_address: row.get(1)?,
        threat_type: row.get(2)?,
        severity: ThreatSeverity::from_str_name(&row.get::<_, String>(3)?).unwrap_or_default(),
        threat_source: row.get(4)?,
        description: row.get(5)?,
        confidence_score: row.get(6)?,
        first_seen: parse_ts(&row.get::<_, String>(7)?),
        last_seen: parse_ts(&row.get::<_, String>(8)?),
        report_count: row.get(9)?,
        is_active: row.get::<_, i32>(10)? != 0,
        is_whitelisted: row.get::<_, i32>(11)? != 0,
        is_blacklisted: row.get::<_, i32>(12)? != 0,
        country: row.get(13)?,
    })
}

fn tier_from_row(row: &Row<'_>) -> Result<SubscriptionTier> {
    Ok(SubscriptionTier {
        id: row.get(0)?,
        name: row.get(1)?,
        is_system_tier: row.get::<_, i32>(2)? != 0,
        bypass_standard_rate_limits: row.get::<_, i32>(3)? != 0,
        daily_api_quota: row.get(4)?,
        default_rate_limit: row.get(5)?,
        default_time_window_secs: row.get(6)?,
    })
}

fn quota_from_row(row: &Row<'_>) -> Result<UserQuota> {
    Ok(UserQuota {
        user_id: row.get(0)?,
        subscription_tier_id: row.get(1)?,
        api_calls_used_today: row.get(2)?,
        max_daily_api_calls: row.get(3)?,
        last_reset: parse_ts(&row.get::<_, String>(4)?),
        last_updated: parse_ts(&row.get::<_, String>(5)?),
        is_exempt_from_quota: row.get::<_, i32>(6)? != 0,
        has_received_quota_warning: row.get::<_, i32>(7)? != 0,
    })
}
