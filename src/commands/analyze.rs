use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use a11yscan_analyzer::{write_backlog, write_results, BacklogRow, BatchAnalyzer, ResultRow};
use a11yscan_cache::AnalysisCache;
use a11yscan_clients::{HttpInferenceInvoker, ReqwestFetcher};
use a11yscan_core::config::AppConfig;

use super::bootstrap;

fn build_analyzer(config: &AppConfig, storage: Arc<a11yscan_storage::Storage>) -> Result<Arc<BatchAnalyzer>> {
    let fetcher = Arc::new(ReqwestFetcher::new(
        &config.discovery.user_agent,
        config.discovery.max_body_bytes,
    )?);
    let invoker = Arc::new(HttpInferenceInvoker::new(
        &config.ai.inference_url,
        &config.ai.inference_model,
        config.ai.inference_api_key.clone(),
    )?);
    Ok(Arc::new(BatchAnalyzer::new(
        storage,
        fetcher,
        invoker,
        AnalysisCache::new(
            Duration::from_secs(config.ai.cache_ttl_hours * 3600),
            10_000,
        ),
        config.ai.clone(),
        Duration::from_secs(config.discovery.fetch_timeout_seconds),
    )))
}

pub async fn run(
    config: AppConfig,
    scan: Option<i64>,
    limit: i64,
    parallel: usize,
    results_out: Option<String>,
) -> Result<()> {
    let (storage, _queue, _cache) = bootstrap(&config).await?;
    let analyzer = build_analyzer(&config, Arc::clone(&storage))?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current mini-batch");
            signal_cancel.cancel();
        }
    });

    let outcomes = match scan {
        Some(scan_id) => vec![(scan_id, analyzer.run_scan(scan_id, &cancel).await)],
        None => {
            Arc::clone(&analyzer)
                .run_backlog(limit, parallel, cancel.clone())
                .await
        }
    };

    let mut result_rows = Vec::new();
    for (scan_id, outcome) in &outcomes {
        match outcome {
            Ok(summary) => {
                println!(
                    "scan {scan_id}: {}/{} mini-batches ({} cached, {} invoked, {} tokens){}",
                    summary.already_completed + summary.newly_completed,
                    summary.total_batches,
                    summary.cache_hits,
                    summary.invocations,
                    summary.tokens_used,
                    if summary.cancelled { " [interrupted]" } else { "" },
                );
                if results_out.is_some() {
                    if let Ok(Some(scan_row)) = storage.get_scan(*scan_id).await {
                        let verifications = storage.list_verifications(*scan_id).await?;
                        result_rows.push(ResultRow {
                            scan_id: *scan_id,
                            url: scan_row.url,
                            wcag_level: scan_row.wcag_level,
                            verifications,
                            tokens_used: scan_row.ai_tokens_used,
                        });
                    }
                }
            }
            Err(e) => println!("scan {scan_id}: failed: {e}"),
        }
    }

    if let Some(path) = results_out {
        let bytes = write_results(&result_rows)?;
        std::fs::write(&path, bytes)?;
        println!("results written to {path}");
    }
    Ok(())
}

pub async fn export_backlog(config: AppConfig, output: String, limit: i64) -> Result<()> {
    let (storage, _queue, _cache) = bootstrap(&config).await?;

    let pending = storage.list_pending_ai_scans(limit).await?;
    let mut rows = Vec::with_capacity(pending.len());
    for scan in pending {
        let existing_issues = storage.list_issues(scan.id).await?;
        rows.push(BacklogRow {
            scan_id: scan.id,
            url: scan.url,
            wcag_level: scan.wcag_level,
            existing_issues,
        });
    }

    let bytes = write_backlog(&rows)?;
    std::fs::write(&output, bytes)?;
    println!("{} pending scans written to {output}", rows.len());
    Ok(())
}
