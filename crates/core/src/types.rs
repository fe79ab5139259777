use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryMode {
    Auto,
    Manual,
}

impl DiscoveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Auto => "AUTO",
            DiscoveryMode::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO" => Some(DiscoveryMode::Auto),
            "MANUAL" => Some(DiscoveryMode::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryStatus::Pending => "PENDING",
            DiscoveryStatus::Running => "RUNNING",
            DiscoveryStatus::Completed => "COMPLETED",
            DiscoveryStatus::Failed => "FAILED",
            DiscoveryStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(DiscoveryStatus::Pending),
            "RUNNING" => Some(DiscoveryStatus::Running),
            "COMPLETED" => Some(DiscoveryStatus::Completed),
            "FAILED" => Some(DiscoveryStatus::Failed),
            "CANCELLED" => Some(DiscoveryStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscoveryStatus::Completed | DiscoveryStatus::Failed | DiscoveryStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryPhase {
    Sitemap,
    Navigation,
    Crawl,
    None,
}

impl DiscoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryPhase::Sitemap => "SITEMAP",
            DiscoveryPhase::Navigation => "NAVIGATION",
            DiscoveryPhase::Crawl => "CRAWL",
            DiscoveryPhase::None => "NONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SITEMAP" => Some(DiscoveryPhase::Sitemap),
            "NAVIGATION" => Some(DiscoveryPhase::Navigation),
            "CRAWL" => Some(DiscoveryPhase::Crawl),
            "NONE" => Some(DiscoveryPhase::None),
            _ => None,
        }
    }
}

/// One bounded enumeration of reachable pages on a single origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discovery {
    pub id: i64,
    pub session_id: String,
    pub homepage_url: String,
    pub mode: DiscoveryMode,
    pub status: DiscoveryStatus,
    pub phase: DiscoveryPhase,
    pub max_pages: u32,
    pub max_depth: u32,
    pub partial_results: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageSource {
    Sitemap,
    Navigation,
    Crawled,
    Manual,
}

impl PageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSource::Sitemap => "SITEMAP",
            PageSource::Navigation => "NAVIGATION",
            PageSource::Crawled => "CRAWLED",
            PageSource::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SITEMAP" => Some(PageSource::Sitemap),
            "NAVIGATION" => Some(PageSource::Navigation),
            "CRAWLED" => Some(PageSource::Crawled),
            "MANUAL" => Some(PageSource::Manual),
            _ => None,
        }
    }
}

/// A page found during discovery. `url` is stored canonical; the pair
/// `(discovery_id, url)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPage {
    pub id: i64,
    pub discovery_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub source: PageSource,
    pub depth: u32,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WcagLevel {
    A,
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "AAA")]
    Aaa,
}

impl WcagLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WcagLevel::A => "A",
            WcagLevel::Aa => "AA",
            WcagLevel::Aaa => "AAA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(WcagLevel::A),
            "AA" => Some(WcagLevel::Aa),
            "AAA" => Some(WcagLevel::Aaa),
            _ => None,
        }
    }

    /// Conformance is cumulative: AA includes A, AAA includes both.
    pub fn includes(&self, other: WcagLevel) -> bool {
        other <= *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Running => "RUNNING",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScanStatus::Pending),
            "RUNNING" => Some(ScanStatus::Running),
            "COMPLETED" => Some(ScanStatus::Completed),
            "FAILED" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiStatus::Pending => "PENDING",
            AiStatus::Processing => "PROCESSING",
            AiStatus::Completed => "COMPLETED",
            AiStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AiStatus::Pending),
            "PROCESSING" => Some(AiStatus::Processing),
            "COMPLETED" => Some(AiStatus::Completed),
            "FAILED" => Some(AiStatus::Failed),
            _ => None,
        }
    }
}

/// A single accessibility scan of one URL. `email` is nullable so it can be
/// cleared once a notification has been delivered (or permanently failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: i64,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub batch_id: Option<i64>,
    pub url: String,
    pub wcag_level: WcagLevel,
    pub email: Option<String>,
    pub status: ScanStatus,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub ai_enabled: bool,
    pub ai_status: Option<AiStatus>,
    pub ai_tokens_used: i64,
    pub ai_duration_ms: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    Critical,
    Serious,
    Moderate,
    Minor,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Critical => "CRITICAL",
            Impact::Serious => "SERIOUS",
            Impact::Moderate => "MODERATE",
            Impact::Minor => "MINOR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(Impact::Critical),
            "SERIOUS" => Some(Impact::Serious),
            "MODERATE" => Some(Impact::Moderate),
            "MINOR" => Some(Impact::Minor),
            _ => None,
        }
    }
}

/// One accessibility violation found on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub rule_id: String,
    pub impact: Impact,
    pub wcag_criteria: Vec<String>,
    pub description: String,
    pub help_text: String,
    pub help_url: String,
    pub html_snippet: Option<String>,
    pub css_selector: Option<String>,
    pub ai_explanation: Option<String>,
    pub ai_fix_suggestion: Option<String>,
    /// 1 (cosmetic) .. 10 (blocks access entirely).
    pub ai_priority: Option<u8>,
}

/// Aggregate counts for one completed scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub total_issues: i32,
    pub critical_count: i32,
    pub serious_count: i32,
    pub moderate_count: i32,
    pub minor_count: i32,
    pub passed_checks: i32,
    pub inapplicable_checks: i32,
}

impl ScanResult {
    /// Tally aggregate counts from a list of issues plus the audit's
    /// passed/inapplicable check counts.
    pub fn from_issues(issues: &[Issue], passed_checks: i32, inapplicable_checks: i32) -> Self {
        let mut result = ScanResult {
            total_issues: issues.len() as i32,
            passed_checks,
            inapplicable_checks,
            ..ScanResult::default()
        };
        for issue in issues {
            match issue.impact {
                Impact::Critical => result.critical_count += 1,
                Impact::Serious => result.serious_count += 1,
                Impact::Moderate => result.moderate_count += 1,
                Impact::Minor => result.minor_count += 1,
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Stale,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "PENDING",
            BatchStatus::Running => "RUNNING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Cancelled => "CANCELLED",
            BatchStatus::Stale => "STALE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BatchStatus::Pending),
            "RUNNING" => Some(BatchStatus::Running),
            "COMPLETED" => Some(BatchStatus::Completed),
            "FAILED" => Some(BatchStatus::Failed),
            "CANCELLED" => Some(BatchStatus::Cancelled),
            "STALE" => Some(BatchStatus::Stale),
            _ => None,
        }
    }
}

/// A multi-page scan over one site. Invariant:
/// `completed_count + failed_count <= total_urls`, with equality exactly
/// when the batch is COMPLETED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScan {
    pub id: i64,
    pub session_id: Option<String>,
    pub homepage_url: String,
    pub wcag_level: WcagLevel,
    pub status: BatchStatus,
    pub total_urls: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchScan {
    pub fn children_terminal(&self) -> bool {
        self.completed_count + self.failed_count >= self.total_urls
    }
}

/// Resumable state for one scan's AI analysis run. Survives crashes;
/// `completed_batches` only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub scan_id: i64,
    pub url: String,
    pub wcag_level: WcagLevel,
    pub total_batches: i32,
    pub completed_batches: Vec<i32>,
    pub tokens_used: i64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn is_complete(&self) -> bool {
        self.completed_batches.len() as i32 >= self.total_batches
    }

    pub fn contains(&self, index: i32) -> bool {
        self.completed_batches.binary_search(&index).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(ReportFormat::Pdf),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Generating,
    Ready,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Generating => "generating",
            ReportStatus::Ready => "ready",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generating" => Some(ReportStatus::Generating),
            "ready" => Some(ReportStatus::Ready),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

/// A requested export. `csv` completes synchronously; `pdf`/`json` start as
/// `generating` and clients poll until `ready` or `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub id: i64,
    pub scan_id: Option<i64>,
    pub batch_id: Option<i64>,
    pub format: ReportFormat,
    pub status: ReportStatus,
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pass,
    Fail,
    CannotTell,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pass => "pass",
            VerificationStatus::Fail => "fail",
            VerificationStatus::CannotTell => "cannot_tell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(VerificationStatus::Pass),
            "fail" => Some(VerificationStatus::Fail),
            "cannot_tell" => Some(VerificationStatus::CannotTell),
            _ => None,
        }
    }
}

/// One criterion-level judgement produced by an AI mini-batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiVerification {
    pub criterion_id: String,
    pub status: VerificationStatus,
    pub explanation: String,
    pub fix_suggestion: Option<String>,
    /// 1 (cosmetic) .. 10 (blocks access entirely).
    pub priority: Option<u8>,
}

/// Month bucket for usage counters, e.g. "2026-08". The reset boundary is
/// implicit: the first increment of a new month key starts a fresh row.
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wcag_level_is_cumulative() {
        assert!(WcagLevel::Aaa.includes(WcagLevel::A));
        assert!(WcagLevel::Aaa.includes(WcagLevel::Aa));
        assert!(WcagLevel::Aa.includes(WcagLevel::A));
        assert!(!WcagLevel::A.includes(WcagLevel::Aa));
        assert!(WcagLevel::A.includes(WcagLevel::A));
    }

    #[test]
    fn enum_text_round_trips() {
        for status in [
            DiscoveryStatus::Pending,
            DiscoveryStatus::Running,
            DiscoveryStatus::Completed,
            DiscoveryStatus::Failed,
            DiscoveryStatus::Cancelled,
        ] {
            assert_eq!(DiscoveryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DiscoveryStatus::parse("BOGUS"), None);
        assert_eq!(WcagLevel::parse("AA"), Some(WcagLevel::Aa));
    }

    #[test]
    fn scan_result_tallies_by_impact() {
        let issue = |impact| Issue {
            rule_id: "color-contrast".into(),
            impact,
            wcag_criteria: vec!["1.4.3".into()],
            description: "".into(),
            help_text: "".into(),
            help_url: "".into(),
            html_snippet: None,
            css_selector: None,
            ai_explanation: None,
            ai_fix_suggestion: None,
            ai_priority: None,
        };
        let issues = vec![
            issue(Impact::Critical),
            issue(Impact::Serious),
            issue(Impact::Serious),
            issue(Impact::Minor),
        ];
        let result = ScanResult::from_issues(&issues, 40, 12);
        assert_eq!(result.total_issues, 4);
        assert_eq!(result.critical_count, 1);
        assert_eq!(result.serious_count, 2);
        assert_eq!(result.moderate_count, 0);
        assert_eq!(result.minor_count, 1);
        assert_eq!(result.passed_checks, 40);
        assert_eq!(result.inapplicable_checks, 12);
    }

    #[test]
    fn month_key_formats_utc() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(month_key(at), "2026-03");
    }

    #[test]
    fn checkpoint_contains_uses_sorted_indices() {
        let cp = Checkpoint {
            scan_id: 1,
            url: "https://example.com".into(),
            wcag_level: WcagLevel::Aa,
            total_batches: 5,
            completed_batches: vec![0, 2, 4],
            tokens_used: 0,
            updated_at: Utc::now(),
        };
        assert!(cp.contains(0));
        assert!(!cp.contains(1));
        assert!(cp.contains(4));
        assert!(!cp.is_complete());
    }
}
