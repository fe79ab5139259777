use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use a11yscan_core::config::BatchConfig;
use a11yscan_core::{month_key, BatchScan, ServiceError, WcagLevel};
use a11yscan_parser::url_rules::{canonicalize, deduplicate, validate};
use a11yscan_queue::{EnqueueOpts, JobQueue, QueueName};
use a11yscan_storage::{NewScan, Storage};

use crate::payloads::ScanPagePayload;

/// Admits new batches under the discovery quota, fans child scans out to
/// the `scan-page` queue, and runs the janitor that flags idle batches
/// STALE.
pub struct BatchScheduler {
    storage: Arc<Storage>,
    queue: JobQueue,
    config: BatchConfig,
    monthly_limit: u32,
}

impl BatchScheduler {
    pub fn new(
        storage: Arc<Storage>,
        queue: JobQueue,
        config: BatchConfig,
        monthly_limit: u32,
    ) -> Self {
        Self {
            storage,
            queue,
            config,
            monthly_limit,
        }
    }

    /// Create a batch and its child scans, then enqueue one `scan-page` job
    /// per child. The same monthly quota that gates discoveries gates
    /// batches; the counter increments only after the batch row exists.
    pub async fn create_batch(
        &self,
        subject_key: &str,
        homepage_url: &str,
        wcag_level: WcagLevel,
        urls: &[String],
        email: Option<&str>,
        ai_enabled: bool,
    ) -> Result<BatchScan, ServiceError> {
        let month = month_key(Utc::now());
        let used = self.storage.get_usage(subject_key, &month).await?;
        if used >= self.monthly_limit as i64 {
            return Err(ServiceError::UsageLimitExceeded {
                limit: self.monthly_limit,
            });
        }

        let homepage = canonicalize(homepage_url);
        validate(&homepage, &homepage)?;

        let mut accepted: Vec<String> = Vec::new();
        for url in deduplicate(urls) {
            match validate(&url, &homepage) {
                Ok(_) => accepted.push(url),
                Err(e) => warn!(url = %url, code = e.code(), "batch url rejected"),
            }
        }
        if accepted.is_empty() {
            return Err(ServiceError::InvalidUrl(
                "no valid same-domain urls in batch".into(),
            ));
        }

        let batch = self
            .storage
            .create_batch(
                Some(subject_key),
                &homepage,
                wcag_level,
                accepted.len() as i32,
                email,
            )
            .await?;
        self.storage.increment_usage(subject_key, &month).await?;

        for url in &accepted {
            let scan = self
                .storage
                .create_scan(NewScan {
                    session_id: Some(subject_key),
                    user_id: None,
                    batch_id: Some(batch.id),
                    url,
                    wcag_level,
                    email: None,
                    ai_enabled,
                })
                .await?;
            let payload = ScanPagePayload { scan_id: scan.id };
            self.queue
                .enqueue(
                    QueueName::ScanPage,
                    serde_json::to_value(&payload).unwrap_or_default(),
                    EnqueueOpts::default(),
                )
                .await?;
        }
        self.storage.mark_batch_running(batch.id).await?;

        info!(batch_id = batch.id, children = accepted.len(), "batch scheduled");
        self.storage
            .get_batch(batch.id)
            .await?
            .ok_or(ServiceError::BatchNotFound(batch.id))
    }

    pub async fn get(&self, id: i64) -> Result<BatchScan, ServiceError> {
        self.storage
            .get_batch(id)
            .await?
            .ok_or(ServiceError::BatchNotFound(id))
    }

    pub async fn cancel(&self, id: i64) -> Result<BatchScan, ServiceError> {
        let batch = self.get(id).await?;
        self.storage
            .set_batch_status(batch.id, a11yscan_core::BatchStatus::Cancelled)
            .await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        Ok(self.storage.delete_batch(id).await?)
    }

    /// Periodic sweep marking batches with no child progress as STALE.
    pub async fn run_janitor(&self, cancel: CancellationToken) {
        let mut tick =
            tokio::time::interval(Duration::from_secs(self.config.janitor_interval_seconds));
        info!(
            idle_minutes = self.config.stale_idle_minutes,
            "batch janitor started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("batch janitor stopped");
                    return;
                }
                _ = tick.tick() => {
                    match self.storage.mark_stale_batches(self.config.stale_idle_minutes).await {
                        Ok(0) => {}
                        Ok(marked) => warn!(marked, "batches marked stale"),
                        Err(e) => error!("stale sweep failed: {e}"),
                    }
                }
            }
        }
    }
}
