pub mod error;
pub mod report;

pub use error::ScoringApiError;
pub use report::{ExportedReport, PreviewImage, RegionScore, ScoreTotals, SessionEvent, SessionEventKind};
