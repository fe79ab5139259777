use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{FetchError, InferenceError};
use crate::types::{Issue, WcagLevel};

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true)
    }
}

/// Plain HTTP document fetcher. Body size is bounded by the implementation;
/// oversized responses fail with `FetchError::BodyTooLarge`.
#[async_trait]
pub trait HtmlFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// Outcome of driving a real browser against one URL and running the
/// accessibility rule engine in the rendered page.
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub issues: Vec<Issue>,
    pub passed_checks: i32,
    pub inapplicable_checks: i32,
}

#[async_trait]
pub trait HeadlessBrowser: Send + Sync + 'static {
    /// Load the URL, wait for render, evaluate the accessibility rules at
    /// the given conformance level.
    async fn audit(
        &self,
        url: &Url,
        level: WcagLevel,
        timeout: Duration,
    ) -> Result<AuditReport, anyhow::Error>;

    /// Print an HTML document to PDF bytes.
    async fn render_pdf(&self, html: &str, timeout: Duration) -> Result<Vec<u8>, anyhow::Error>;
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct EmailReceipt {
    pub message_id: String,
}

/// Provider-facing mail dispatch. Errors propagate so the queue can retry.
#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send(&self, message: &EmailMessage) -> Result<EmailReceipt, anyhow::Error>;
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Artifact storage with expiring read URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        ttl: Duration,
    ) -> Result<StoredObject, anyhow::Error>;
}

#[derive(Debug, Clone)]
pub struct InferenceOutput {
    pub output: String,
    pub duration_ms: u64,
    pub tokens_used: i64,
}

/// External model invocation. Implementations classify transport failures
/// into `InferenceError` variants; the analyzer maps those to its backoff
/// schedules.
#[async_trait]
pub trait InferenceInvoker: Send + Sync + 'static {
    async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<InferenceOutput, InferenceError>;
}
