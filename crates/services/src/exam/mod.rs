mod controller;
mod ticks;

pub use controller::{ExamController, ExportReceipt, ExportStatus};
pub use ticks::{IntervalTicks, ManualTicks, TickHandle, TickSource};
