mod backlog;
mod criteria;
mod partition;
mod processor;
mod prompt;
mod retry;
mod runner;

pub use backlog::{read_backlog, write_backlog, write_results, BacklogRow, ResultRow};
pub use criteria::{criteria_for_level, Criterion};
pub use partition::{partition, MiniBatch};
pub use processor::{AiBatchPayload, AiBatchProcessor};
pub use prompt::{build_prompt, parse_output};
pub use retry::retry_delay;
pub use runner::{AnalysisSummary, BatchAnalyzer};
