//! Vigil is a behavioral analytics and abuse-control engine for multi-tenant
//! web backends. It keeps an append-only ledger of user actions, scores each
//! action against the user's historical baseline, tracks IP reputation with
//! pattern-based threat detection, and enforces per-tier daily quotas and
//! endpoint rate limits.
//!
//! All state lives in a single SQLite database behind [`SqliteStore`]; the
//! analysis engines share it through an `Arc`. Anything on the request path
//! fails open: a storage error degrades to "not anomalous", "not a threat"
//! or "quota available" rather than refusing the request.

pub mod analytics;
pub mod config;
pub mod models;
pub mod quota;
pub mod retention;
pub mod storage;
pub mod threat;

pub use analytics::ledger::{ActivityEvent, BehaviorLedger};
pub use analytics::patterns::PatternAggregator;
pub use analytics::scorer::AnomalyScorer;
pub use config::settings::Settings;
pub use models::behavior::{BehaviorPattern, BehaviorRecord, RiskLevel, UserBaseline};
pub use models::quota::{RemainingQuota, ResolvedRateLimit, SubscriptionTier, UserQuota};
pub use models::threat::{IpReputation, RecommendedAction, ThreatRecord, ThreatSeverity};
pub use quota::rate_limit::RateLimitResolver;
pub use quota::tiers::TierResolver;
pub use quota::usage::QuotaTracker;
pub use retention::RetentionSweeper;
pub use storage::sqlite::SqliteStore;
pub use threat::intelligence::ThreatIntelligence;

/// Install a fmt subscriber routed to the test writer so `RUST_LOG` surfaces
/// engine logs during test runs. Safe to call from every test; only the
/// first call wins.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
