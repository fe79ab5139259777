use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub database: DatabaseConfig,
    pub discovery: DiscoveryConfig,
    pub queue: QueueConfig,
    pub email: EmailConfig,
    pub batch: BatchConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Public base URL, used to build artifact links.
    pub app_url: String,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    #[serde(default = "default_artifact_ttl_hours")]
    pub artifact_ttl_hours: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub postgres_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: u32,
    #[serde(default = "default_max_pages")]
    pub default_max_pages: u32,
    #[serde(default = "default_max_depth")]
    pub default_max_depth: u32,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_min_origin_delay_ms")]
    pub min_origin_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_sitemap_max_bytes")]
    pub sitemap_max_bytes: usize,
    #[serde(default = "default_sitemap_max_urls")]
    pub sitemap_max_urls: usize,
    #[serde(default = "default_sitemap_max_depth")]
    pub sitemap_max_depth: u32,
    #[serde(default = "default_result_cache_ttl_hours")]
    pub result_cache_ttl_hours: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_attempts")]
    pub default_attempts: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Active jobs whose lock is older than this are considered abandoned
    /// and released back to waiting.
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
    #[serde(default = "default_remove_on_complete")]
    pub remove_on_complete: u32,
    #[serde(default = "default_remove_on_fail")]
    pub remove_on_fail: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
    /// Completion emails for scans faster than this are suppressed.
    #[serde(default = "default_fast_scan_threshold_ms")]
    pub fast_scan_threshold_ms: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_stale_idle_minutes")]
    pub stale_idle_minutes: i64,
    #[serde(default = "default_janitor_interval_seconds")]
    pub janitor_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    #[serde(default = "default_ai_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_ai_mini_batch_size")]
    pub mini_batch_size: usize,
    #[serde(default = "default_ai_delay_seconds")]
    pub delay_seconds: u64,
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_ai_retries")]
    pub retries: u32,
    #[serde(default = "default_ai_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    pub inference_url: String,
    #[serde(default = "default_inference_model")]
    pub inference_model: String,
    #[serde(default)]
    pub inference_api_key: Option<String>,
}

fn default_worker_concurrency() -> usize { 10 }
fn default_artifact_dir() -> String { "data/artifacts".to_string() }
fn default_artifact_ttl_hours() -> u64 { 24 }
fn default_monthly_limit() -> u32 { 3 }
fn default_max_pages() -> u32 { 100 }
fn default_max_depth() -> u32 { 3 }
fn default_max_concurrent_fetches() -> usize { 10 }
fn default_min_origin_delay_ms() -> u64 { 100 }
fn default_fetch_timeout_seconds() -> u64 { 30 }
fn default_max_body_bytes() -> usize { 5 * 1024 * 1024 }
fn default_sitemap_max_bytes() -> usize { 5 * 1024 * 1024 }
fn default_sitemap_max_urls() -> usize { 50_000 }
fn default_sitemap_max_depth() -> u32 { 3 }
fn default_result_cache_ttl_hours() -> u64 { 24 }
fn default_user_agent() -> String {
    "a11yscan/0.1 (+https://a11yscan.dev/bot)".to_string()
}
fn default_poll_interval_ms() -> u64 { 500 }
fn default_attempts() -> u32 { 5 }
fn default_backoff_initial_ms() -> u64 { 1_000 }
fn default_backoff_max_ms() -> u64 { 60_000 }
fn default_lock_timeout_seconds() -> u64 { 300 }
fn default_remove_on_complete() -> u32 { 100 }
fn default_remove_on_fail() -> u32 { 1_000 }
fn default_fast_scan_threshold_ms() -> i64 { 30_000 }
fn default_stale_idle_minutes() -> i64 { 30 }
fn default_janitor_interval_seconds() -> u64 { 60 }
fn default_ai_batch_size() -> usize { 100 }
fn default_ai_mini_batch_size() -> usize { 5 }
fn default_ai_delay_seconds() -> u64 { 2 }
fn default_ai_timeout_ms() -> u64 { 180_000 }
fn default_ai_retries() -> u32 { 3 }
fn default_ai_cache_ttl_hours() -> u64 { 24 }
fn default_inference_model() -> String { "gpt-4o-mini".to_string() }
