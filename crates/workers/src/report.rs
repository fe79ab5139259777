use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use a11yscan_core::collaborators::{HeadlessBrowser, ObjectStore};
use a11yscan_core::{
    BatchScan, Issue, ReportArtifact, ReportFormat, ReportStatus, Scan, ScanResult, ServiceError,
    WorkerError,
};
use a11yscan_queue::{Job, Processor};
use a11yscan_storage::Storage;

use crate::payloads::GenerateReportPayload;

fn csv_err(e: impl std::fmt::Display) -> WorkerError {
    WorkerError::Other(anyhow::anyhow!("csv build failed: {e}"))
}

/// Flat issue listing, one row per issue. This is the synchronous export
/// path — the API can call it without going through the queue.
pub fn build_scan_csv(
    scan: &Scan,
    result: &ScanResult,
    issues: &[Issue],
) -> Result<Vec<u8>, WorkerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "scan_id",
            "url",
            "wcag_level",
            "rule_id",
            "impact",
            "wcag_criteria",
            "description",
            "help_url",
            "css_selector",
        ])
        .map_err(csv_err)?;
    for issue in issues {
        writer
            .write_record([
                scan.id.to_string().as_str(),
                scan.url.as_str(),
                scan.wcag_level.as_str(),
                issue.rule_id.as_str(),
                issue.impact.as_str(),
                issue.wcag_criteria.join(";").as_str(),
                issue.description.as_str(),
                issue.help_url.as_str(),
                issue.css_selector.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
    }
    if issues.is_empty() {
        // Header-only files confuse spreadsheet users; add a summary row.
        let note = format!("no issues found ({} checks passed)", result.passed_checks);
        writer
            .write_record([
                scan.id.to_string().as_str(),
                scan.url.as_str(),
                scan.wcag_level.as_str(),
                "",
                "",
                "",
                note.as_str(),
                "",
                "",
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(csv_err)
}

pub fn build_batch_csv(batch: &BatchScan, scans: &[Scan]) -> Result<Vec<u8>, WorkerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["batch_id", "scan_id", "url", "status", "duration_ms", "error"])
        .map_err(csv_err)?;
    for scan in scans {
        writer
            .write_record([
                batch.id.to_string().as_str(),
                scan.id.to_string().as_str(),
                scan.url.as_str(),
                scan.status.as_str(),
                scan.duration_ms.map(|d| d.to_string()).unwrap_or_default().as_str(),
                scan.error_message.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(csv_err)
}

pub fn build_scan_json(scan: &Scan, result: &ScanResult, issues: &[Issue]) -> Vec<u8> {
    let value = json!({
        "scan": {
            "id": scan.id,
            "url": scan.url,
            "wcagLevel": scan.wcag_level.as_str(),
            "status": scan.status.as_str(),
            "durationMs": scan.duration_ms,
            "completedAt": scan.completed_at,
        },
        "result": result,
        "issues": issues,
    });
    serde_json::to_vec_pretty(&value).unwrap_or_default()
}

fn impact_row(label: &str, count: i32) -> String {
    format!("<tr><td>{label}</td><td>{count}</td></tr>")
}

pub(crate) fn render_scan_report_html(
    scan: &Scan,
    result: &ScanResult,
    issues: &[Issue],
) -> String {
    let mut issue_rows = String::new();
    for issue in issues {
        issue_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            issue.rule_id,
            issue.impact.as_str(),
            issue.wcag_criteria.join(", "),
            issue.description,
        ));
    }
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Accessibility report</title></head>\
         <body>\
         <h1>Accessibility report</h1>\
         <p>{url} &mdash; WCAG {level}</p>\
         <h2>Summary</h2>\
         <table>{summary}</table>\
         <h2>Issues ({total})</h2>\
         <table><tr><th>Rule</th><th>Impact</th><th>Criteria</th><th>Description</th></tr>{rows}</table>\
         </body></html>",
        url = scan.url,
        level = scan.wcag_level.as_str(),
        summary = [
            impact_row("Critical", result.critical_count),
            impact_row("Serious", result.serious_count),
            impact_row("Moderate", result.moderate_count),
            impact_row("Minor", result.minor_count),
            impact_row("Passed checks", result.passed_checks),
        ]
        .join(""),
        total = result.total_issues,
        rows = issue_rows,
    )
}

pub(crate) fn render_batch_report_html(batch: &BatchScan, scans: &[Scan]) -> String {
    let mut rows = String::new();
    for scan in scans {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            scan.url,
            scan.status.as_str(),
            scan.duration_ms.map(|d| format!("{d} ms")).unwrap_or_default(),
        ));
    }
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Site report</title></head>\
         <body>\
         <h1>Site accessibility report</h1>\
         <p>{url} &mdash; WCAG {level}</p>\
         <p>{completed} of {total} pages scanned, {failed} failed.</p>\
         <table><tr><th>Page</th><th>Status</th><th>Duration</th></tr>{rows}</table>\
         </body></html>",
        url = batch.homepage_url,
        level = batch.wcag_level.as_str(),
        completed = batch.completed_count,
        total = batch.total_urls,
        failed = batch.failed_count,
        rows = rows,
    )
}

/// `generate-report` queue processor. CSV is cheap and usually served
/// synchronously; the queued path covers `pdf` and `json`, with clients
/// polling the artifact row until it is `ready` or `failed`.
pub struct ReportProcessor {
    storage: Arc<Storage>,
    browser: Arc<dyn HeadlessBrowser>,
    store: Arc<dyn ObjectStore>,
    artifact_ttl: Duration,
    pdf_timeout: Duration,
}

impl ReportProcessor {
    pub fn new(
        storage: Arc<Storage>,
        browser: Arc<dyn HeadlessBrowser>,
        store: Arc<dyn ObjectStore>,
        artifact_ttl: Duration,
        pdf_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            browser,
            store,
            artifact_ttl,
            pdf_timeout,
        }
    }

    fn parse(job: &Job) -> Result<GenerateReportPayload, WorkerError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::Other(anyhow::anyhow!("bad generate-report payload: {e}")))
    }

    async fn build_bytes(&self, report: &ReportArtifact) -> Result<Vec<u8>, WorkerError> {
        if let Some(scan_id) = report.scan_id {
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
            let issues = self
                .storage
                .list_issues(scan_id)
                .await
                .map_err(ServiceError::from)?;

            return match report.format {
                ReportFormat::Csv => build_scan_csv(&scan, &result, &issues),
                ReportFormat::Json => Ok(build_scan_json(&scan, &result, &issues)),
                ReportFormat::Pdf => {
                    let html = render_scan_report_html(&scan, &result, &issues);
                    self.browser
                        .render_pdf(&html, self.pdf_timeout)
                        .await
                        .map_err(WorkerError::Other)
                }
            };
        }

        if let Some(batch_id) = report.batch_id {
            let batch = self
                .storage
                .get_batch(batch_id)
                .await
                .map_err(ServiceError::from)?
                .ok_or(ServiceError::BatchNotFound(batch_id))?;
            let scans = self
                .storage
                .list_batch_scans(batch_id)
                .await
                .map_err(ServiceError::from)?;

            return match report.format {
                ReportFormat::Csv => build_batch_csv(&batch, &scans),
                ReportFormat::Json => Ok(serde_json::to_vec_pretty(&json!({
                    "batch": &batch,
                    "scans": &scans,
                }))
                .unwrap_or_default()),
                ReportFormat::Pdf => {
                    let html = render_batch_report_html(&batch, &scans);
                    self.browser
                        .render_pdf(&html, self.pdf_timeout)
                        .await
                        .map_err(WorkerError::Other)
                }
            };
        }

        Err(WorkerError::Other(anyhow::anyhow!(
            "report {} has neither scan nor batch",
            report.id
        )))
    }
}

#[async_trait]
impl Processor for ReportProcessor {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, WorkerError> {
        let payload = Self::parse(job)?;
        let report = self
            .storage
            .get_report(payload.report_id)
            .await
            .map_err(ServiceError::from)?
            .ok_or_else(|| {
                WorkerError::Other(anyhow::anyhow!("report {} not found", payload.report_id))
            })?;

        if report.status == ReportStatus::Ready {
            return Ok(json!({ "skipped": true, "url": report.url }));
        }

        let bytes = self.build_bytes(&report).await?;
        let owner = report
            .scan_id
            .map(|id| format!("scan-{id}"))
            .or_else(|| report.batch_id.map(|id| format!("batch-{id}")))
            .unwrap_or_else(|| "orphan".to_string());
        let key = format!(
            "reports/{owner}/report-{}.{}",
            report.id,
            report.format.as_str()
        );

        let stored = self
            .store
            .put(&key, bytes, report.format.content_type(), self.artifact_ttl)
            .await
            .map_err(WorkerError::Other)?;

        self.storage
            .mark_report_ready(report.id, &stored.url, stored.expires_at)
            .await
            .map_err(ServiceError::from)?;

        info!(report_id = report.id, url = %stored.url, "report ready");
        Ok(json!({ "url": stored.url, "expiresAt": stored.expires_at }))
    }

    async fn on_permanent_failure(&self, job: &Job, error: &WorkerError) {
        let Ok(payload) = Self::parse(job) else {
            error!(job_id = job.id, "unparseable payload in report failure hook");
            return;
        };
        if let Err(e) = self
            .storage
            .mark_report_failed(payload.report_id, &error.to_string())
            .await
        {
            error!(report_id = payload.report_id, "mark_report_failed failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11yscan_core::{Impact, ScanStatus, WcagLevel};
    use chrono::Utc;

    fn scan() -> Scan {
        Scan {
            id: 3,
            session_id: None,
            user_id: None,
            batch_id: None,
            url: "https://example.com/".into(),
            wcag_level: WcagLevel::Aa,
            email: None,
            status: ScanStatus::Completed,
            duration_ms: Some(41_000),
            error_message: None,
            ai_enabled: false,
            ai_status: None,
            ai_tokens_used: 0,
            ai_duration_ms: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    fn issue() -> Issue {
        Issue {
            rule_id: "image-alt".into(),
            impact: Impact::Critical,
            wcag_criteria: vec!["1.1.1".into()],
            description: "Image missing alt text".into(),
            help_text: "Add an alt attribute".into(),
            help_url: "https://rules.test/image-alt".into(),
            html_snippet: Some("<img src=\"x.png\">".into()),
            css_selector: Some("img:nth-child(2)".into()),
            ai_explanation: None,
            ai_fix_suggestion: None,
            ai_priority: None,
        }
    }

    #[test]
    fn scan_csv_has_one_row_per_issue() {
        let result = ScanResult::from_issues(&[issue()], 10, 2);
        let bytes = build_scan_csv(&scan(), &result, &[issue()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.trim().lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("scan_id,url,wcag_level"));
        assert!(lines[1].contains("image-alt"));
        assert!(lines[1].contains("CRITICAL"));
    }

    #[test]
    fn scan_json_includes_result_and_issues() {
        let issues = vec![issue()];
        let result = ScanResult::from_issues(&issues, 10, 2);
        let bytes = build_scan_json(&scan(), &result, &issues);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["scan"]["wcagLevel"], "AA");
        assert_eq!(value["result"]["total_issues"], 1);
        assert_eq!(value["issues"][0]["rule_id"], "image-alt");
    }

    #[test]
    fn scan_report_html_lists_issues() {
        let issues = vec![issue()];
        let result = ScanResult::from_issues(&issues, 10, 2);
        let html = render_scan_report_html(&scan(), &result, &issues);
        assert!(html.contains("image-alt"));
        assert!(html.contains("WCAG AA"));
        assert!(html.contains("1.1.1"));
    }
}
