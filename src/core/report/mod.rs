pub mod render;
pub mod state;
pub mod template;

pub use render::{export_report, finalize_report, PatientDetails, PdfRenderer, ReportExport, WkhtmltopdfRenderer};
pub use state::{ReportPhase, SessionReportState};
pub use template::{locate_class_value, set_region_class, ReportTemplate};
