use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use a11yscan_cache::{content_hash, AnalysisCache, CachedAnalysis};
use a11yscan_core::collaborators::{HtmlFetcher, InferenceInvoker};
use a11yscan_core::config::AiConfig;
use a11yscan_core::{
    AiStatus, AiVerification, InferenceError, Scan, ServiceError, WorkerError,
};
use a11yscan_storage::Storage;

use crate::criteria::criteria_for_level;
use crate::partition::{partition, MiniBatch};
use crate::prompt::{build_prompt, parse_output};
use crate::retry::retry_delay;

#[derive(Debug, Clone, Default)]
pub struct AnalysisSummary {
    pub scan_id: i64,
    pub total_batches: usize,
    pub already_completed: usize,
    pub newly_completed: usize,
    pub cache_hits: usize,
    pub invocations: usize,
    pub tokens_used: i64,
    pub cancelled: bool,
}

/// Drives the AI analysis of one scan: deterministic mini-batch partition,
/// content-addressed caching, classified retry backoff, and a durable
/// checkpoint after every mini-batch. Mini-batches run strictly in order
/// per scan; different scans may run in parallel.
pub struct BatchAnalyzer {
    storage: Arc<Storage>,
    fetcher: Arc<dyn HtmlFetcher>,
    invoker: Arc<dyn InferenceInvoker>,
    cache: AnalysisCache,
    config: AiConfig,
    fetch_timeout: Duration,
}

enum MiniBatchOutcome {
    Done { tokens: i64, invoked: bool },
    Cancelled,
}

impl BatchAnalyzer {
    pub fn new(
        storage: Arc<Storage>,
        fetcher: Arc<dyn HtmlFetcher>,
        invoker: Arc<dyn InferenceInvoker>,
        cache: AnalysisCache,
        config: AiConfig,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            fetcher,
            invoker,
            cache,
            config,
            fetch_timeout,
        }
    }

    pub async fn run_scan(
        &self,
        scan_id: i64,
        cancel: &CancellationToken,
    ) -> Result<AnalysisSummary, WorkerError> {
        let scan = self
            .storage
            .get_scan(scan_id)
            .await
            .map_err(ServiceError::from)?
            .ok_or(ServiceError::ScanNotFound(scan_id))?;

        if !scan.ai_enabled {
            return Err(WorkerError::Other(anyhow::anyhow!(
                "scan {scan_id} does not have AI analysis enabled"
            )));
        }
        if scan.ai_status == Some(AiStatus::Completed) {
            debug!(scan_id, "ai analysis already complete");
            return Ok(AnalysisSummary {
                scan_id,
                ..AnalysisSummary::default()
            });
        }

        self.storage
            .set_ai_status(scan_id, AiStatus::Processing)
            .await
            .map_err(ServiceError::from)?;

        let html = match self.fetch_page(&scan).await {
            Ok(html) => html,
            Err(e) => {
                self.mark_failed(scan_id).await;
                return Err(e);
            }
        };
        let page_hash = content_hash(html.as_bytes());

        let criteria = criteria_for_level(scan.wcag_level);
        let mini_batches = partition(&criteria, self.config.mini_batch_size, self.config.batch_size);
        let total = mini_batches.len();

        let mut checkpoint = self
            .storage
            .init_checkpoint(scan_id, &scan.url, scan.wcag_level, total as i32)
            .await
            .map_err(ServiceError::from)?;

        let mut summary = AnalysisSummary {
            scan_id,
            total_batches: total,
            already_completed: checkpoint.completed_batches.len(),
            ..AnalysisSummary::default()
        };
        info!(
            scan_id,
            total,
            resumed = summary.already_completed,
            level = scan.wcag_level.as_str(),
            "ai analysis started"
        );

        let last_index = mini_batches.last().map(|mb| mb.index);
        for mini_batch in &mini_batches {
            if checkpoint.contains(mini_batch.index as i32) {
                continue;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self
                .run_mini_batch(&scan, &page_hash, &html, mini_batch, cancel)
                .await?
            {
                MiniBatchOutcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
                MiniBatchOutcome::Done { tokens, invoked } => {
                    checkpoint = self
                        .storage
                        .record_completed_batch(scan_id, mini_batch.index as i32, tokens)
                        .await
                        .map_err(ServiceError::from)?;
                    summary.newly_completed += 1;
                    summary.tokens_used += tokens;
                    if invoked {
                        summary.invocations += 1;
                        // Spacing between invocations; nothing to wait for
                        // after the last mini-batch.
                        if last_index != Some(mini_batch.index) {
                            let delay = Duration::from_secs(self.config.delay_seconds);
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    summary.cancelled = true;
                                    break;
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    } else {
                        summary.cache_hits += 1;
                    }
                }
            }
        }

        if !summary.cancelled && checkpoint.is_complete() {
            self.storage
                .set_ai_status(scan_id, AiStatus::Completed)
                .await
                .map_err(ServiceError::from)?;
            info!(
                scan_id,
                invocations = summary.invocations,
                cache_hits = summary.cache_hits,
                tokens = summary.tokens_used,
                "ai analysis complete"
            );
        } else if summary.cancelled {
            info!(scan_id, "ai analysis interrupted, checkpoint retained");
        }

        Ok(summary)
    }

    /// Analyze pending scans from the backlog, several scans in flight at
    /// once, each scan's mini-batches strictly sequential.
    pub async fn run_backlog(
        self: Arc<Self>,
        limit: i64,
        parallel_scans: usize,
        cancel: CancellationToken,
    ) -> Vec<(i64, Result<AnalysisSummary, WorkerError>)> {
        let pending = match self.storage.list_pending_ai_scans(limit).await {
            Ok(scans) => scans,
            Err(e) => {
                warn!("backlog query failed: {e}");
                return Vec::new();
            }
        };
        info!(scans = pending.len(), "processing ai backlog");

        let mut results = Vec::with_capacity(pending.len());
        let mut in_flight: JoinSet<(i64, Result<AnalysisSummary, WorkerError>)> = JoinSet::new();
        let mut queue = pending.into_iter();
        let cap = parallel_scans.max(1);

        loop {
            while in_flight.len() < cap && !cancel.is_cancelled() {
                let Some(scan) = queue.next() else { break };
                let analyzer = Arc::clone(&self);
                let cancel = cancel.clone();
                in_flight.spawn(async move {
                    let result = analyzer.run_scan(scan.id, &cancel).await;
                    (scan.id, result)
                });
            }
            match in_flight.join_next().await {
                Some(Ok(entry)) => results.push(entry),
                Some(Err(e)) => warn!("analysis task panicked: {e}"),
                None => break,
            }
        }
        results
    }

    async fn fetch_page(&self, scan: &Scan) -> Result<String, WorkerError> {
        let url = Url::parse(&scan.url).map_err(|_| ServiceError::InvalidUrl(scan.url.clone()))?;
        let response = self
            .fetcher
            .fetch(&url, self.fetch_timeout)
            .await
            .map_err(|e| InferenceError::UrlUnreachable(format!("{}: {e}", scan.url)))?;
        if response.status >= 400 {
            return Err(InferenceError::UrlUnreachable(format!(
                "{} returned {}",
                scan.url, response.status
            ))
            .into());
        }
        Ok(response.body_text())
    }

    async fn run_mini_batch(
        &self,
        scan: &Scan,
        page_hash: &str,
        html: &str,
        mini_batch: &MiniBatch,
        cancel: &CancellationToken,
    ) -> Result<MiniBatchOutcome, WorkerError> {
        // Content-addressed reuse: an identical page analyzed at this level
        // and index costs nothing.
        if let Some(cached) = self
            .cache
            .get(page_hash, scan.wcag_level, mini_batch.index)
            .await
        {
            debug!(
                scan_id = scan.id,
                index = mini_batch.index,
                "mini-batch served from cache"
            );
            self.persist(scan.id, mini_batch.index, &cached.verifications)
                .await?;
            return Ok(MiniBatchOutcome::Done {
                tokens: 0,
                invoked: false,
            });
        }

        let prompt = build_prompt(scan.id, &scan.url, scan.wcag_level, &mini_batch.criteria, html);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut attempt: u32 = 0;

        let (verifications, tokens, duration_ms) = loop {
            let invocation = tokio::select! {
                _ = cancel.cancelled() => {
                    // Shutdown kills the in-flight invocation; the next
                    // mini-batch is never started.
                    return Ok(MiniBatchOutcome::Cancelled);
                }
                result = self.invoker.invoke(&prompt, timeout) => result,
            };

            let error = match invocation {
                Ok(output) => match parse_output(&output.output, scan.id) {
                    Ok(verifications) => {
                        break (verifications, output.tokens_used, output.duration_ms as i64)
                    }
                    Err(parse_error) => parse_error,
                },
                Err(invoke_error) => invoke_error,
            };

            if attempt >= self.config.retries {
                warn!(
                    scan_id = scan.id,
                    index = mini_batch.index,
                    code = error.code(),
                    "mini-batch failed after {attempt} retries"
                );
                self.mark_failed(scan.id).await;
                return Err(error.into());
            }
            let delay = retry_delay(error.is_rate_limit(), attempt);
            warn!(
                scan_id = scan.id,
                index = mini_batch.index,
                code = error.code(),
                delay_s = delay.as_secs(),
                attempt,
                "mini-batch failed, backing off"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(MiniBatchOutcome::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        };

        self.cache
            .put(
                page_hash,
                scan.wcag_level,
                mini_batch.index,
                CachedAnalysis {
                    verifications: verifications.clone(),
                    tokens_used: tokens,
                    model: self.config.inference_model.clone(),
                    stored_at: Utc::now(),
                },
            )
            .await;

        self.persist(scan.id, mini_batch.index, &verifications).await?;
        self.storage
            .add_ai_counters(scan.id, tokens, duration_ms)
            .await
            .map_err(ServiceError::from)?;

        Ok(MiniBatchOutcome::Done {
            tokens,
            invoked: true,
        })
    }

    async fn persist(
        &self,
        scan_id: i64,
        index: usize,
        verifications: &[AiVerification],
    ) -> Result<(), WorkerError> {
        self.storage
            .store_verifications(scan_id, index as i32, verifications)
            .await
            .map_err(ServiceError::from)?;
        Ok(())
    }

    async fn mark_failed(&self, scan_id: i64) {
        if let Err(e) = self.storage.set_ai_status(scan_id, AiStatus::Failed).await {
            warn!(scan_id, "ai status update failed: {e}");
        }
    }
}
