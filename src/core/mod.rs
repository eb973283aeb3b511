pub mod classify;
pub mod config;
pub mod error;
pub mod region;
pub mod report;
pub mod session;
pub mod video;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ScoringConfig;
pub use error::ScoringError;
pub use region::{RegionKey, RegionScoreMap, Severity, Totals};
pub use session::{SessionController, SessionUpdate};
