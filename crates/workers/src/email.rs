use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use a11yscan_core::collaborators::EmailSender;
use a11yscan_core::{ServiceError, WorkerError};
use a11yscan_queue::{Job, Processor};
use a11yscan_storage::Storage;

use crate::payloads::{EmailKind, SendEmailPayload};
use crate::templates;

/// The fast-scan gate: completion mails for quick scans are noise, so
/// anything under the threshold is suppressed. Failure and batch mails are
/// never gated.
pub fn should_send_scan_complete(duration_ms: Option<i64>, threshold_ms: i64) -> bool {
    duration_ms.map(|d| d >= threshold_ms).unwrap_or(true)
}

/// `send-email` queue processor. On success the owning row's address is
/// nullified; on permanent failure the address is nullified anyway — the
/// stored email never outlives the notification attempt.
pub struct EmailProcessor {
    storage: Arc<Storage>,
    sender: Arc<dyn EmailSender>,
    fast_scan_threshold_ms: i64,
    app_url: String,
}

impl EmailProcessor {
    pub fn new(
        storage: Arc<Storage>,
        sender: Arc<dyn EmailSender>,
        fast_scan_threshold_ms: i64,
        app_url: String,
    ) -> Self {
        Self {
            storage,
            sender,
            fast_scan_threshold_ms,
            app_url,
        }
    }

    fn parse(job: &Job) -> Result<SendEmailPayload, WorkerError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::Other(anyhow::anyhow!("bad send-email payload: {e}")))
    }

    async fn nullify(&self, payload: &SendEmailPayload) {
        if let Some(scan_id) = payload.scan_id {
            if let Err(e) = self.storage.nullify_scan_email(scan_id).await {
                error!(scan_id, "email nullification failed: {e}");
            }
        }
        if let Some(batch_id) = payload.batch_id {
            if let Err(e) = self.storage.nullify_batch_email(batch_id).await {
                error!(batch_id, "email nullification failed: {e}");
            }
        }
    }
}

#[async_trait]
impl Processor for EmailProcessor {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, WorkerError> {
        let payload = Self::parse(job)?;

        let message = match payload.kind {
            EmailKind::ScanComplete => {
                let scan_id = payload
                    .scan_id
                    .ok_or_else(|| WorkerError::Other(anyhow::anyhow!("scan_id missing")))?;
                let scan = self
                    .storage
                    .get_scan(scan_id)
                    .await
                    .map_err(ServiceError::from)?
                    .ok_or(ServiceError::ScanNotFound(scan_id))?;
                let result = self
                    .storage
                    .get_scan_result(scan_id)
                    .await
                    .map_err(ServiceError::from)?
                    .ok_or(ServiceError::NoResults(scan_id))?;

                if !should_send_scan_complete(scan.duration_ms, self.fast_scan_threshold_ms) {
                    info!(scan_id, duration_ms = ?scan.duration_ms, "fast scan, completion email suppressed");
                    self.nullify(&payload).await;
                    return Ok(json!({
                        "sent": false,
                        "skipped": true,
                        "emailNullified": true,
                    }));
                }

                templates::scan_complete_email(&payload.email, &scan, &result, &self.app_url)
            }
            EmailKind::ScanFailed => {
                let scan_id = payload
                    .scan_id
                    .ok_or_else(|| WorkerError::Other(anyhow::anyhow!("scan_id missing")))?;
                let scan = self
                    .storage
                    .get_scan(scan_id)
                    .await
                    .map_err(ServiceError::from)?
                    .ok_or(ServiceError::ScanNotFound(scan_id))?;
                templates::scan_failed_email(&payload.email, &scan, &self.app_url)
            }
            EmailKind::BatchComplete => {
                let batch_id = payload
                    .batch_id
                    .ok_or_else(|| WorkerError::Other(anyhow::anyhow!("batch_id missing")))?;
                let batch = self
                    .storage
                    .get_batch(batch_id)
                    .await
                    .map_err(ServiceError::from)?
                    .ok_or(ServiceError::BatchNotFound(batch_id))?;
                templates::batch_complete_email(&payload.email, &batch, &self.app_url)
            }
        };

        let receipt = self
            .sender
            .send(&message)
            .await
            .map_err(|e| WorkerError::SendFailed(e.to_string()))?;

        // GDPR: the address has served its purpose.
        self.nullify(&payload).await;
        info!(message_id = %receipt.message_id, kind = ?payload.kind, "email sent");

        Ok(json!({
            "sent": true,
            "messageId": receipt.message_id,
            "emailNullified": true,
        }))
    }

    async fn on_permanent_failure(&self, job: &Job, error: &WorkerError) {
        warn!(
            job_id = job.id,
            code = error.code(),
            "send-email permanently failed, nullifying stored address"
        );
        match Self::parse(job) {
            Ok(payload) => self.nullify(&payload).await,
            Err(e) => error!(job_id = job.id, "unparseable payload in failure hook: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_suppresses_only_fast_scans() {
        assert!(!should_send_scan_complete(Some(5_000), 30_000));
        assert!(!should_send_scan_complete(Some(29_999), 30_000));
        assert!(should_send_scan_complete(Some(30_000), 30_000));
        assert!(should_send_scan_complete(Some(120_000), 30_000));
        // Unknown duration errs on the side of sending.
        assert!(should_send_scan_complete(None, 30_000));
    }
}
