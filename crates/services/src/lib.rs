#![forbid(unsafe_code)]

pub mod error;
pub mod exam;
pub mod exam_file;
pub mod history;
pub mod report;

pub use exam_core::Clock;

pub use error::{ExamError, ExamFileError, HistoryError, ReportError};
pub use exam::{
    ExamController, ExportReceipt, ExportStatus, IntervalTicks, ManualTicks, TickHandle,
    TickSource,
};
pub use exam_file::{ExamFile, load_exam_file, parse_exam_file};
pub use history::{HistoryItem, HistoryService};
pub use report::{FileReportWriter, ReportArtifact, ReportFormat, ReportWriter};
