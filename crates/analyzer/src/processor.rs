use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use a11yscan_core::{AiStatus, WorkerError};
use a11yscan_queue::{Job, Processor};
use a11yscan_storage::Storage;

use crate::runner::BatchAnalyzer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiBatchPayload {
    pub scan_id: i64,
}

/// `ai-batch` queue processor: one job analyzes one scan end to end. The
/// checkpoint makes redelivery cheap — completed mini-batches are skipped.
pub struct AiBatchProcessor {
    analyzer: Arc<BatchAnalyzer>,
    storage: Arc<Storage>,
    shutdown: CancellationToken,
}

impl AiBatchProcessor {
    pub fn new(
        analyzer: Arc<BatchAnalyzer>,
        storage: Arc<Storage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            storage,
            shutdown,
        }
    }

    fn parse(job: &Job) -> Result<AiBatchPayload, WorkerError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::Other(anyhow::anyhow!("bad ai-batch payload: {e}")))
    }
}

#[async_trait]
impl Processor for AiBatchProcessor {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, WorkerError> {
        let payload = Self::parse(job)?;
        let summary = self
            .analyzer
            .run_scan(payload.scan_id, &self.shutdown)
            .await?;

        if summary.cancelled {
            // Interrupted by shutdown; rethrow so the queue redelivers and
            // the checkpoint resumes the remainder.
            return Err(WorkerError::Other(anyhow::anyhow!(
                "analysis interrupted at {}/{} mini-batches",
                summary.already_completed + summary.newly_completed,
                summary.total_batches
            )));
        }

        Ok(json!({
            "scanId": summary.scan_id,
            "totalBatches": summary.total_batches,
            "invocations": summary.invocations,
            "cacheHits": summary.cache_hits,
            "tokensUsed": summary.tokens_used,
        }))
    }

    async fn on_permanent_failure(&self, job: &Job, error: &WorkerError) {
        let Ok(payload) = Self::parse(job) else {
            error!(job_id = job.id, "unparseable payload in ai failure hook");
            return;
        };
        warn!(
            scan_id = payload.scan_id,
            code = error.code(),
            "ai analysis permanently failed"
        );
        if let Err(e) = self
            .storage
            .set_ai_status(payload.scan_id, AiStatus::Failed)
            .await
        {
            error!(scan_id = payload.scan_id, "ai status update failed: {e}");
        }
    }
}
