use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

use a11yscan_core::collaborators::HeadlessBrowser;
use a11yscan_core::{Scan, ScanResult, ServiceError, WorkerError};
use a11yscan_queue::{EnqueueOpts, Job, JobQueue, Processor, QueueName};
use a11yscan_storage::Storage;

use crate::payloads::{BatchReportPayload, EmailKind, ScanPagePayload, SendEmailPayload};

/// `scan-page` queue processor: drive the browser audit, persist the
/// results, keep the parent batch's counters honest, and hand off email
/// notification to the `send-email` queue.
pub struct ScanProcessor {
    storage: Arc<Storage>,
    browser: Arc<dyn HeadlessBrowser>,
    queue: JobQueue,
    audit_timeout: Duration,
}

impl ScanProcessor {
    pub fn new(
        storage: Arc<Storage>,
        browser: Arc<dyn HeadlessBrowser>,
        queue: JobQueue,
        audit_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            browser,
            queue,
            audit_timeout,
        }
    }

    fn parse(job: &Job) -> Result<ScanPagePayload, WorkerError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::Other(anyhow::anyhow!("bad scan-page payload: {e}")))
    }

    async fn load_scan(&self, scan_id: i64) -> Result<Scan, WorkerError> {
        Ok(self
            .storage
            .get_scan(scan_id)
            .await
            .map_err(ServiceError::from)?
            .ok_or(ServiceError::ScanNotFound(scan_id))?)
    }

    async fn enqueue_email(&self, scan: &Scan, kind: EmailKind) {
        let Some(email) = scan.email.clone() else {
            return;
        };
        let payload = SendEmailPayload {
            scan_id: Some(scan.id),
            batch_id: None,
            email,
            kind,
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
            error!(scan_id = scan.id, "email enqueue failed: {e}");
        }
    }

    /// Fold a terminal child into its batch; when the last child lands,
    /// emit the batch-report job.
    async fn record_batch_progress(&self, scan: &Scan, success: bool) {
        let Some(batch_id) = scan.batch_id else {
            return;
        };
        match self.storage.record_child_result(batch_id, success).await {
            Ok(Some(batch)) if batch.children_terminal() => {
                info!(batch_id, "all batch children terminal, queueing batch report");
                let payload = BatchReportPayload { batch_id };
                if let Err(e) = self
                    .queue
                    .enqueue(
                        QueueName::BatchReport,
                        serde_json::to_value(&payload).unwrap_or_default(),
                        EnqueueOpts::default(),
                    )
                    .await
                {
                    error!(batch_id, "batch-report enqueue failed: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => error!(batch_id, scan_id = scan.id, "batch counter update failed: {e}"),
        }
    }
}

#[async_trait]
impl Processor for ScanProcessor {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, WorkerError> {
        let payload = Self::parse(job)?;
        let scan = self.load_scan(payload.scan_id).await?;

        // At-least-once delivery: a redelivered job for a finished scan is
        // a no-op.
        if scan.status.is_terminal() {
            return Ok(json!({ "skipped": true, "status": scan.status.as_str() }));
        }

        self.storage
            .mark_scan_running(scan.id)
            .await
            .map_err(ServiceError::from)?;

        let url = Url::parse(&scan.url)
            .map_err(|_| ServiceError::InvalidUrl(scan.url.clone()))?;

        let started = Instant::now();
        let report = self
            .browser
            .audit(&url, scan.wcag_level, self.audit_timeout)
            .await
            .map_err(WorkerError::Other)?;
        let duration_ms = started.elapsed().as_millis() as i64;

        let result = ScanResult::from_issues(
            &report.issues,
            report.passed_checks,
            report.inapplicable_checks,
        );
        self.storage
            .complete_scan(scan.id, duration_ms, &result, &report.issues)
            .await
            .map_err(ServiceError::from)?;

        info!(
            scan_id = scan.id,
            url = %scan.url,
            issues = result.total_issues,
            duration_ms,
            "scan completed"
        );

        self.record_batch_progress(&scan, true).await;
        self.enqueue_email(&scan, EmailKind::ScanComplete).await;

        Ok(json!({
            "scanId": scan.id,
            "totalIssues": result.total_issues,
            "durationMs": duration_ms,
        }))
    }

    /// Retries exhausted: the scan is failed for good, the batch hears
    /// about it, and the owner gets a failure notice.
    async fn on_permanent_failure(&self, job: &Job, error: &WorkerError) {
        let Ok(payload) = Self::parse(job) else {
            error!(job_id = job.id, "unparseable payload in scan failure hook");
            return;
        };
        warn!(scan_id = payload.scan_id, code = error.code(), "scan permanently failed");

        if let Err(e) = self
            .storage
            .fail_scan(payload.scan_id, &error.to_string(), None)
            .await
        {
            error!(scan_id = payload.scan_id, "fail_scan failed: {e}");
            return;
        }

        match self.load_scan(payload.scan_id).await {
            Ok(scan) => {
                self.record_batch_progress(&scan, false).await;
                self.enqueue_email(&scan, EmailKind::ScanFailed).await;
            }
            Err(e) => error!(scan_id = payload.scan_id, "scan reload failed: {e}"),
        }
    }
}
