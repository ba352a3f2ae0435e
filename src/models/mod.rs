pub mod behavior;
pub mod quota;
pub mod threat;
