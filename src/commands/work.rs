use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use a11yscan_analyzer::{AiBatchProcessor, BatchAnalyzer};
use a11yscan_cache::AnalysisCache;
use a11yscan_clients::{
    ChromeBrowser, FsObjectStore, HttpInferenceInvoker, ReqwestFetcher, SmtpEmailSender,
};
use a11yscan_core::collaborators::{EmailSender, HeadlessBrowser, ObjectStore};
use a11yscan_core::config::AppConfig;
use a11yscan_queue::{Processor, QueueName, Worker};
use a11yscan_workers::{BatchReportProcessor, BatchScheduler, EmailProcessor, ReportProcessor, ScanProcessor};

use super::bootstrap;

/// Per-queue worker concurrency. Browser-bound work gets the configured
/// concurrency; the lighter queues run narrower.
fn concurrency_for(queue: QueueName, scan_concurrency: usize) -> usize {
    match queue {
        QueueName::ScanPage => scan_concurrency,
        QueueName::GenerateReport => 2,
        QueueName::SendEmail => 5,
        QueueName::BatchReport => 2,
        QueueName::AiBatch => 2,
    }
}

pub async fn run(
    config: AppConfig,
    queues: Option<Vec<String>>,
    concurrency: Option<usize>,
) -> Result<()> {
    let (storage, queue, _cache) = bootstrap(&config).await?;

    let selected: Vec<QueueName> = match queues {
        None => QueueName::ALL.to_vec(),
        Some(names) => names
            .iter()
            .map(|name| {
                QueueName::parse(name).ok_or_else(|| anyhow!("unknown queue: {name}"))
            })
            .collect::<Result<Vec<_>>>()?,
    };
    let scan_concurrency = concurrency.unwrap_or(config.general.worker_concurrency);

    // Collaborators shared by every processor.
    let browser: Arc<dyn HeadlessBrowser> = Arc::new(ChromeBrowser::launch()?);
    let sender: Arc<dyn EmailSender> = Arc::new(SmtpEmailSender::new(
        &config.email.smtp_url,
        &config.email.from_address,
    )?);
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(
        &config.general.artifact_dir,
        &config.general.app_url,
    ));
    let fetcher = Arc::new(ReqwestFetcher::new(
        &config.discovery.user_agent,
        config.discovery.max_body_bytes,
    )?);
    let invoker = Arc::new(HttpInferenceInvoker::new(
        &config.ai.inference_url,
        &config.ai.inference_model,
        config.ai.inference_api_key.clone(),
    )?);

    let artifact_ttl = Duration::from_secs(config.general.artifact_ttl_hours * 3600);
    let pdf_timeout = Duration::from_secs(60);
    let audit_timeout = Duration::from_secs(config.discovery.fetch_timeout_seconds);
    let shutdown = CancellationToken::new();

    let analyzer = Arc::new(BatchAnalyzer::new(
        Arc::clone(&storage),
        fetcher,
        invoker,
        AnalysisCache::new(
            Duration::from_secs(config.ai.cache_ttl_hours * 3600),
            10_000,
        ),
        config.ai.clone(),
        Duration::from_secs(config.discovery.fetch_timeout_seconds),
    ));

    let mut handles = Vec::new();
    for name in &selected {
        let processor: Arc<dyn Processor> = match name {
            QueueName::ScanPage => Arc::new(ScanProcessor::new(
                Arc::clone(&storage),
                Arc::clone(&browser),
                queue.clone(),
                audit_timeout,
            )),
            QueueName::GenerateReport => Arc::new(ReportProcessor::new(
                Arc::clone(&storage),
                Arc::clone(&browser),
                Arc::clone(&store),
                artifact_ttl,
                pdf_timeout,
            )),
            QueueName::SendEmail => Arc::new(EmailProcessor::new(
                Arc::clone(&storage),
                Arc::clone(&sender),
                config.email.fast_scan_threshold_ms,
                config.general.app_url.clone(),
            )),
            QueueName::BatchReport => Arc::new(BatchReportProcessor::new(
                Arc::clone(&storage),
                Arc::clone(&browser),
                Arc::clone(&store),
                queue.clone(),
                artifact_ttl,
                pdf_timeout,
            )),
            QueueName::AiBatch => Arc::new(AiBatchProcessor::new(
                Arc::clone(&analyzer),
                Arc::clone(&storage),
                shutdown.clone(),
            )),
        };

        let worker = Worker::new(
            queue.clone(),
            *name,
            processor,
            concurrency_for(*name, scan_concurrency),
        )
        .poll_interval(Duration::from_millis(config.queue.poll_interval_ms))
        .lock_timeout_seconds(config.queue.lock_timeout_seconds);

        let cancel = shutdown.clone();
        handles.push(tokio::spawn(worker.run(cancel)));
    }

    // Janitor: flags batches with no child progress as STALE.
    let scheduler = BatchScheduler::new(
        Arc::clone(&storage),
        queue.clone(),
        config.batch.clone(),
        config.discovery.monthly_limit,
    );
    let janitor_cancel = shutdown.clone();
    handles.push(tokio::spawn(async move {
        scheduler.run_janitor(janitor_cancel).await;
    }));

    info!(queues = selected.len(), scan_concurrency, "workers running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();

    for handle in handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}
