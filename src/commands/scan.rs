use anyhow::{anyhow, Result};

use a11yscan_core::config::AppConfig;
use a11yscan_core::{ReportFormat, WcagLevel};
use a11yscan_queue::{EnqueueOpts, QueueName};
use a11yscan_storage::NewScan;
use a11yscan_workers::{
    build_batch_csv, build_scan_csv, BatchScheduler, GenerateReportPayload, ScanPagePayload,
};

use super::bootstrap;

fn parse_level(level: &str) -> Result<WcagLevel> {
    WcagLevel::parse(&level.to_uppercase())
        .ok_or_else(|| anyhow!("unknown WCAG level: {level} (expected A, AA, or AAA)"))
}

pub async fn run(
    config: AppConfig,
    url: String,
    level: String,
    email: Option<String>,
    ai: bool,
    session: String,
) -> Result<()> {
    let (storage, queue, _cache) = bootstrap(&config).await?;
    let wcag_level = parse_level(&level)?;

    let scan = storage
        .create_scan(NewScan {
            session_id: Some(&session),
            user_id: None,
            batch_id: None,
            url: &url,
            wcag_level,
            email: email.as_deref(),
            ai_enabled: ai,
        })
        .await?;

    let job_id = queue
        .enqueue(
            QueueName::ScanPage,
            serde_json::to_value(ScanPagePayload { scan_id: scan.id })?,
            EnqueueOpts {
                attempts: config.queue.default_attempts,
                ..EnqueueOpts::default()
            },
        )
        .await?;

    println!("scan {} queued (job {job_id}) for {} at WCAG {}", scan.id, url, wcag_level.as_str());
    println!("run `a11yscan work` to process it");
    Ok(())
}

pub async fn batch(
    config: AppConfig,
    homepage: String,
    urls: Vec<String>,
    level: String,
    email: Option<String>,
    ai: bool,
    session: String,
) -> Result<()> {
    let (storage, queue, _cache) = bootstrap(&config).await?;
    let wcag_level = parse_level(&level)?;

    // A single argument naming a file is a URL list, one per line.
    let urls = if urls.len() == 1 && std::path::Path::new(&urls[0]).exists() {
        std::fs::read_to_string(&urls[0])?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    } else {
        urls
    };
    if urls.is_empty() {
        return Err(anyhow!("no urls given; pass urls or a file of urls"));
    }

    let scheduler = BatchScheduler::new(
        storage,
        queue,
        config.batch.clone(),
        config.discovery.monthly_limit,
    );
    let batch = scheduler
        .create_batch(
            &format!("session:{session}"),
            &homepage,
            wcag_level,
            &urls,
            email.as_deref(),
            ai,
        )
        .await?;

    println!(
        "batch {} queued: {} pages of {} at WCAG {}",
        batch.id,
        batch.total_urls,
        batch.homepage_url,
        wcag_level.as_str()
    );
    Ok(())
}

pub async fn list(config: AppConfig, session: Option<String>, limit: i64) -> Result<()> {
    let (storage, _queue, _cache) = bootstrap(&config).await?;
    let scans = storage.list_scans(session.as_deref(), limit).await?;
    if scans.is_empty() {
        println!("no scans");
        return Ok(());
    }
    for scan in scans {
        println!(
            "scan {} [{}] {} WCAG {} ai={} {}",
            scan.id,
            scan.status.as_str(),
            scan.url,
            scan.wcag_level.as_str(),
            scan.ai_status.map(|s| s.as_str()).unwrap_or("-"),
            scan.duration_ms.map(|d| format!("{d}ms")).unwrap_or_default(),
        );
    }
    Ok(())
}

pub async fn list_batches(config: AppConfig, session: Option<String>, limit: i64) -> Result<()> {
    let (storage, _queue, _cache) = bootstrap(&config).await?;
    let batches = storage.list_batches(session.as_deref(), limit).await?;
    if batches.is_empty() {
        println!("no batches");
        return Ok(());
    }
    for batch in batches {
        println!(
            "batch {} [{}] {} {}/{} done, {} failed",
            batch.id,
            batch.status.as_str(),
            batch.homepage_url,
            batch.completed_count,
            batch.total_urls,
            batch.failed_count,
        );
    }
    Ok(())
}

pub async fn show_report(config: AppConfig, id: i64) -> Result<()> {
    let (storage, _queue, _cache) = bootstrap(&config).await?;
    let report = storage
        .get_report(id)
        .await?
        .ok_or_else(|| anyhow!("report {id} not found"))?;
    println!(
        "report {} [{}] format={}",
        report.id,
        report.status.as_str(),
        report.format.as_str()
    );
    if let (Some(url), Some(expires_at)) = (&report.url, report.expires_at) {
        println!("  url: {url}\n  expires: {expires_at}");
    }
    if let Some(error) = &report.error_message {
        println!("  error: {error}");
    }
    Ok(())
}

pub async fn report(
    config: AppConfig,
    scan: Option<i64>,
    batch: Option<i64>,
    format: String,
) -> Result<()> {
    let (storage, queue, _cache) = bootstrap(&config).await?;
    let format = ReportFormat::parse(&format.to_lowercase())
        .ok_or_else(|| anyhow!("unknown format: {format} (expected pdf, json, or csv)"))?;

    if scan.is_none() && batch.is_none() {
        return Err(anyhow!("pass --scan <id> or --batch <id>"));
    }

    // CSV is cheap: build and print it synchronously.
    if format == ReportFormat::Csv {
        let bytes = match (scan, batch) {
            (Some(scan_id), _) => {
                let scan_row = storage
                    .get_scan(scan_id)
                    .await?
                    .ok_or_else(|| anyhow!("scan {scan_id} not found"))?;
                let result = storage
                    .get_scan_result(scan_id)
                    .await?
                    .ok_or_else(|| anyhow!("scan {scan_id} has no results"))?;
                let issues = storage.list_issues(scan_id).await?;
                build_scan_csv(&scan_row, &result, &issues)?
            }
            (None, Some(batch_id)) => {
                let batch_row = storage
                    .get_batch(batch_id)
                    .await?
                    .ok_or_else(|| anyhow!("batch {batch_id} not found"))?;
                let scans = storage.list_batch_scans(batch_id).await?;
                build_batch_csv(&batch_row, &scans)?
            }
            (None, None) => unreachable!(),
        };
        print!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }

    let artifact = storage.create_report(scan, batch, format).await?;
    queue
        .enqueue(
            QueueName::GenerateReport,
            serde_json::to_value(GenerateReportPayload {
                report_id: artifact.id,
            })?,
            EnqueueOpts::default(),
        )
        .await?;
    println!(
        "report {} is generating; poll `a11yscan status` or the API until ready",
        artifact.id
    );
    Ok(())
}
