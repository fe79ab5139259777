use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use a11yscan_core::collaborators::{HeadlessBrowser, ObjectStore};
use a11yscan_core::{BatchStatus, ReportFormat, ServiceError, WorkerError};
use a11yscan_queue::{EnqueueOpts, Job, JobQueue, Processor, QueueName};
use a11yscan_storage::Storage;

use crate::payloads::{BatchReportPayload, EmailKind, SendEmailPayload};
use crate::report::render_batch_report_html;

/// `batch-report` queue processor: runs once all children are terminal.
/// Produces the site PDF, notifies the owner, and closes out the batch.
pub struct BatchReportProcessor {
    storage: Arc<Storage>,
    browser: Arc<dyn HeadlessBrowser>,
    store: Arc<dyn ObjectStore>,
    queue: JobQueue,
    artifact_ttl: Duration,
    pdf_timeout: Duration,
}

impl BatchReportProcessor {
    pub fn new(
        storage: Arc<Storage>,
        browser: Arc<dyn HeadlessBrowser>,
        store: Arc<dyn ObjectStore>,
        queue: JobQueue,
        artifact_ttl: Duration,
        pdf_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            browser,
            store,
            queue,
            artifact_ttl,
            pdf_timeout,
        }
    }

    fn parse(job: &Job) -> Result<BatchReportPayload, WorkerError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::Other(anyhow::anyhow!("bad batch-report payload: {e}")))
    }
}

#[async_trait]
impl Processor for BatchReportProcessor {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, WorkerError> {
        let payload = Self::parse(job)?;
        let batch = self
            .storage
            .get_batch(payload.batch_id)
            .await
            .map_err(ServiceError::from)?
            .ok_or(ServiceError::BatchNotFound(payload.batch_id))?;

        if batch.status == BatchStatus::Completed {
            return Ok(json!({ "skipped": true }));
        }
        if !batch.children_terminal() {
            // Premature delivery; let the queue retry after backoff.
            return Err(WorkerError::Other(anyhow::anyhow!(
                "batch {} has unfinished children ({}/{} terminal)",
                batch.id,
                batch.completed_count + batch.failed_count,
                batch.total_urls
            )));
        }

        let scans = self
            .storage
            .list_batch_scans(batch.id)
            .await
            .map_err(ServiceError::from)?;

        let artifact = self
            .storage
            .create_report(None, Some(batch.id), ReportFormat::Pdf)
            .await
            .map_err(ServiceError::from)?;
        let html = render_batch_report_html(&batch, &scans);
        let pdf = self
            .browser
            .render_pdf(&html, self.pdf_timeout)
            .await
            .map_err(WorkerError::Other)?;
        let key = format!("reports/batch-{}/report-{}.pdf", batch.id, artifact.id);
        let stored = self
            .store
            .put(&key, pdf, ReportFormat::Pdf.content_type(), self.artifact_ttl)
            .await
            .map_err(WorkerError::Other)?;
        self.storage
            .mark_report_ready(artifact.id, &stored.url, stored.expires_at)
            .await
            .map_err(ServiceError::from)?;

        if let Some(email) = batch.email.clone() {
            let payload = SendEmailPayload {
                scan_id: None,
                batch_id: Some(batch.id),
                email,
                kind: EmailKind::BatchComplete,
            };
            if let Err(e) = self
                .queue
                .enqueue(
                    QueueName::SendEmail,
                    serde_json::to_value(&payload).unwrap_or_default(),
                    EnqueueOpts::default(),
                )
                .await
            {
                error!(batch_id = batch.id, "batch email enqueue failed: {e}");
            }
        }

        self.storage
            .set_batch_status(batch.id, BatchStatus::Completed)
            .await
            .map_err(ServiceError::from)?;

        info!(
            batch_id = batch.id,
            completed = batch.completed_count,
            failed = batch.failed_count,
            report_url = %stored.url,
            "batch completed"
        );
        Ok(json!({ "batchId": batch.id, "reportUrl": stored.url }))
    }

    async fn on_permanent_failure(&self, job: &Job, error: &WorkerError) {
        let Ok(payload) = Self::parse(job) else {
            return;
        };
        error!(
            batch_id = payload.batch_id,
            code = error.code(),
            "batch report permanently failed"
        );
        if let Err(e) = self
            .storage
            .set_batch_status(payload.batch_id, BatchStatus::Failed)
            .await
        {
            error!(batch_id = payload.batch_id, "batch status update failed: {e}");
        }
    }
}
