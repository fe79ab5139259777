mod batch;
mod email;
mod payloads;
mod report;
mod scan;
mod scheduler;
mod templates;

pub use batch::BatchReportProcessor;
pub use email::{should_send_scan_complete, EmailProcessor};
pub use payloads::{
    BatchReportPayload, EmailKind, GenerateReportPayload, ScanPagePayload, SendEmailPayload,
};
pub use report::{build_batch_csv, build_scan_csv, build_scan_json, ReportProcessor};
pub use scan::ScanProcessor;
pub use scheduler::BatchScheduler;
