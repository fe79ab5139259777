use a11yscan_core::collaborators::EmailMessage;
use a11yscan_core::{BatchScan, Scan, ScanResult};

/// Completion notification with the aggregate counts and a results link.
pub fn scan_complete_email(
    to: &str,
    scan: &Scan,
    result: &ScanResult,
    app_url: &str,
) -> EmailMessage {
    let subject = format!("Accessibility scan finished: {}", scan.url);
    let results_url = format!("{}/scans/{}", app_url.trim_end_matches('/'), scan.id);
    let html = format!(
        "<h2>Scan complete</h2>\
         <p>We finished checking <a href=\"{url}\">{url}</a> against WCAG {level}.</p>\
         <ul>\
           <li><strong>{total}</strong> issues found</li>\
           <li>{critical} critical, {serious} serious, {moderate} moderate, {minor} minor</li>\
           <li>{passed} checks passed</li>\
         </ul>\
         <p><a href=\"{results_url}\">View the full report</a></p>",
        url = scan.url,
        level = scan.wcag_level.as_str(),
        total = result.total_issues,
        critical = result.critical_count,
        serious = result.serious_count,
        moderate = result.moderate_count,
        minor = result.minor_count,
        passed = result.passed_checks,
        results_url = results_url,
    );
    let text = format!(
        "Scan complete for {} (WCAG {}).\n\
         {} issues found ({} critical, {} serious, {} moderate, {} minor). {} checks passed.\n\
         Full report: {}",
        scan.url,
        scan.wcag_level.as_str(),
        result.total_issues,
        result.critical_count,
        result.serious_count,
        result.moderate_count,
        result.minor_count,
        result.passed_checks,
        results_url,
    );
    EmailMessage {
        to: to.to_string(),
        subject,
        html,
        text,
    }
}

pub fn scan_failed_email(to: &str, scan: &Scan, app_url: &str) -> EmailMessage {
    let subject = format!("Accessibility scan failed: {}", scan.url);
    let reason = scan
        .error_message
        .as_deref()
        .unwrap_or("the page could not be analyzed");
    let retry_url = format!("{}/scans/new", app_url.trim_end_matches('/'));
    let html = format!(
        "<h2>Scan failed</h2>\
         <p>We could not finish scanning <a href=\"{url}\">{url}</a>: {reason}.</p>\
         <p><a href=\"{retry_url}\">Start a new scan</a></p>",
        url = scan.url,
        reason = reason,
        retry_url = retry_url,
    );
    let text = format!(
        "Scan failed for {}: {}.\nStart a new scan: {}",
        scan.url, reason, retry_url
    );
    EmailMessage {
        to: to.to_string(),
        subject,
        html,
        text,
    }
}

pub fn batch_complete_email(to: &str, batch: &BatchScan, app_url: &str) -> EmailMessage {
    let subject = format!("Site scan finished: {}", batch.homepage_url);
    let results_url = format!("{}/batches/{}", app_url.trim_end_matches('/'), batch.id);
    let html = format!(
        "<h2>Site scan complete</h2>\
         <p>All {total} pages of <a href=\"{url}\">{url}</a> were processed at WCAG {level}.</p>\
         <ul>\
           <li>{completed} pages scanned</li>\
           <li>{failed} pages failed</li>\
         </ul>\
         <p><a href=\"{results_url}\">View the site report</a></p>",
        url = batch.homepage_url,
        level = batch.wcag_level.as_str(),
        total = batch.total_urls,
        completed = batch.completed_count,
        failed = batch.failed_count,
        results_url = results_url,
    );
    let text = format!(
        "Site scan complete for {} (WCAG {}).\n{} of {} pages scanned, {} failed.\nReport: {}",
        batch.homepage_url,
        batch.wcag_level.as_str(),
        batch.completed_count,
        batch.total_urls,
        batch.failed_count,
        results_url,
    );
    EmailMessage {
        to: to.to_string(),
        subject,
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11yscan_core::{AiStatus, ScanStatus, WcagLevel};
    use chrono::Utc;

    fn scan() -> Scan {
        Scan {
            id: 12,
            session_id: None,
            user_id: None,
            batch_id: None,
            url: "https://example.com/pricing".into(),
            wcag_level: WcagLevel::Aa,
            email: Some("user@example.com".into()),
            status: ScanStatus::Completed,
            duration_ms: Some(45_000),
            error_message: None,
            ai_enabled: false,
            ai_status: None::<AiStatus>,
            ai_tokens_used: 0,
            ai_duration_ms: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn scan_complete_email_carries_counts_and_link() {
        let result = ScanResult {
            total_issues: 7,
            critical_count: 1,
            serious_count: 2,
            moderate_count: 3,
            minor_count: 1,
            passed_checks: 50,
            inapplicable_checks: 9,
        };
        let message = scan_complete_email("user@example.com", &scan(), &result, "https://app.test/");
        assert_eq!(message.to, "user@example.com");
        assert!(message.subject.contains("https://example.com/pricing"));
        assert!(message.html.contains("7</strong> issues"));
        assert!(message.html.contains("https://app.test/scans/12"));
        assert!(message.text.contains("1 critical"));
    }

    #[test]
    fn scan_failed_email_includes_reason() {
        let mut failed = scan();
        failed.error_message = Some("page timed out".into());
        let message = scan_failed_email("user@example.com", &failed, "https://app.test");
        assert!(message.html.contains("page timed out"));
        assert!(message.text.contains("page timed out"));
    }
}
