use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use a11yscan_core::WorkerError;

use crate::{FailOutcome, Job, JobQueue, QueueName};

/// A queue handler. Processing must be idempotent on `(job id, payload)` —
/// the queue may deliver the same job twice after a crash.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, WorkerError>;

    /// Fired exactly once when a job exhausts its attempts. Must not throw.
    async fn on_permanent_failure(&self, _job: &Job, _error: &WorkerError) {}
}

/// Pulls jobs from one named queue with a declared concurrency and drives
/// them through a processor until cancelled.
pub struct Worker {
    queue: JobQueue,
    name: QueueName,
    processor: Arc<dyn Processor>,
    concurrency: usize,
    poll_interval: Duration,
    lock_timeout_seconds: u64,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        name: QueueName,
        processor: Arc<dyn Processor>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            name,
            processor,
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_millis(500),
            lock_timeout_seconds: 300,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn lock_timeout_seconds(mut self, seconds: u64) -> Self {
        self.lock_timeout_seconds = seconds;
        self
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            queue = self.name.as_str(),
            concurrency = self.concurrency,
            "worker started"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut recovery_tick = tokio::time::interval(Duration::from_secs(60));

        loop {
            // Fill free slots from the queue.
            while in_flight.len() < self.concurrency {
                if cancel.is_cancelled() {
                    break;
                }
                match self.queue.claim(self.name).await {
                    Ok(Some(job)) => {
                        let queue = self.queue.clone();
                        let processor = Arc::clone(&self.processor);
                        in_flight.spawn(async move {
                            run_one(queue, processor, job).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(queue = self.name.as_str(), "claim failed: {e}");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(queue = self.name.as_str(), "worker draining");
                    while in_flight.join_next().await.is_some() {}
                    break;
                }
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = result {
                        error!(queue = self.name.as_str(), "job task panicked: {e}");
                    }
                }
                _ = recovery_tick.tick() => {
                    match self.queue.release_expired(self.name, self.lock_timeout_seconds).await {
                        Ok(released) if released > 0 => {
                            warn!(queue = self.name.as_str(), released, "released abandoned jobs");
                        }
                        Ok(_) => {}
                        Err(e) => error!(queue = self.name.as_str(), "lock recovery failed: {e}"),
                    }
                }
                _ = tokio::time::sleep(self.poll_interval), if in_flight.is_empty() => {}
            }
        }

        info!(queue = self.name.as_str(), "worker stopped");
    }
}

async fn run_one(queue: JobQueue, processor: Arc<dyn Processor>, job: Job) {
    let queue_name = job.queue.as_str();
    match processor.process(&job).await {
        Ok(_) => {
            if let Err(e) = queue.complete(&job).await {
                error!(queue = queue_name, job_id = job.id, "complete failed: {e}");
            }
        }
        Err(worker_error) => {
            let message = format!("{}: {worker_error}", worker_error.code());
            warn!(
                queue = queue_name,
                job_id = job.id,
                attempts = job.attempts_made,
                max_attempts = job.max_attempts,
                "job failed: {message}"
            );
            match queue.fail(&job, &message).await {
                Ok(FailOutcome::Retried { next_run_at }) => {
                    info!(queue = queue_name, job_id = job.id, %next_run_at, "job scheduled for retry");
                }
                Ok(FailOutcome::PermanentlyFailed(failed)) => {
                    error!(queue = queue_name, job_id = failed.id, "job permanently failed");
                    processor.on_permanent_failure(&failed, &worker_error).await;
                }
                Err(e) => {
                    error!(queue = queue_name, job_id = job.id, "failure bookkeeping failed: {e}");
                }
            }
        }
    }
}
