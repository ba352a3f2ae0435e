pub mod baseline;
pub mod classifier;
pub mod ledger;
pub mod patterns;
pub mod scorer;
