pub mod rate_limit;
pub mod tiers;
pub mod usage;
