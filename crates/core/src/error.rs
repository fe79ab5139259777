use thiserror::Error;

/// Persistence-layer failures. Everything the storage crate surfaces is
/// flattened into one of these so callers never see a raw driver error.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("row not found: {entity} {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("migration failed: {0}")]
    Migration(String),
}

impl RepositoryError {
    pub fn code(&self) -> &'static str {
        match self {
            RepositoryError::Query(_) => "REPOSITORY_QUERY_FAILED",
            RepositoryError::NotFound { .. } => "REPOSITORY_NOT_FOUND",
            RepositoryError::Conflict(_) => "REPOSITORY_CONFLICT",
            RepositoryError::Migration(_) => "REPOSITORY_MIGRATION_FAILED",
        }
    }
}

/// Business-rule failures surfaced to callers before any side effect.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("private address rejected: {0}")]
    PrivateAddress(String),

    #[error("domain mismatch: {url} is not on {homepage}")]
    DomainMismatch { url: String, homepage: String },

    #[error("monthly discovery limit of {limit} reached")]
    UsageLimitExceeded { limit: u32 },

    #[error("discovery {0} not found")]
    DiscoveryNotFound(i64),

    #[error("discovery {0} is already running")]
    DiscoveryAlreadyRunning(i64),

    #[error("discovery {0} was cancelled")]
    DiscoveryCancelled(i64),

    #[error("page already exists in discovery {discovery_id}: {url}")]
    PageAlreadyExists { discovery_id: i64, url: String },

    #[error("discovery page limit of {max_pages} reached")]
    PageLimitReached { max_pages: u32 },

    #[error("scan {0} not found")]
    ScanNotFound(i64),

    #[error("batch {0} not found")]
    BatchNotFound(i64),

    #[error("scan {0} has no results")]
    NoResults(i64),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidUrl(_) => "INVALID_URL",
            ServiceError::UnsupportedScheme(_) => "UNSUPPORTED_SCHEME",
            ServiceError::PrivateAddress(_) => "PRIVATE_ADDRESS",
            ServiceError::DomainMismatch { .. } => "DOMAIN_MISMATCH",
            ServiceError::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
            ServiceError::DiscoveryNotFound(_) => "DISCOVERY_NOT_FOUND",
            ServiceError::DiscoveryAlreadyRunning(_) => "DISCOVERY_ALREADY_RUNNING",
            ServiceError::DiscoveryCancelled(_) => "DISCOVERY_CANCELLED",
            ServiceError::PageAlreadyExists { .. } => "PAGE_ALREADY_EXISTS",
            ServiceError::PageLimitReached { .. } => "PAGE_LIMIT_REACHED",
            ServiceError::ScanNotFound(_) => "SCAN_NOT_FOUND",
            ServiceError::BatchNotFound(_) => "BATCH_NOT_FOUND",
            ServiceError::NoResults(_) => "NO_RESULTS",
            ServiceError::Repository(e) => e.code(),
        }
    }
}

/// Failures raised while processing a job. These bubble to the queue, which
/// retries per the job's backoff until attempts are exhausted.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("sitemap fetch failed: {0}")]
    SitemapFetchFailed(String),

    #[error("navigation extraction failed: {0}")]
    NavigationExtractionFailed(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("email send failed: {0}")]
    SendFailed(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WorkerError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::SitemapFetchFailed(_) => "SITEMAP_FETCH_FAILED",
            WorkerError::NavigationExtractionFailed(_) => "NAVIGATION_EXTRACTION_FAILED",
            WorkerError::Timeout(_) => "TIMEOUT",
            WorkerError::SendFailed(_) => "SEND_FAILED",
            WorkerError::Service(e) => e.code(),
            WorkerError::Inference(e) => e.code(),
            WorkerError::Other(_) => "WORKER_UNKNOWN",
        }
    }
}

/// Outbound fetch failures. Recovered locally inside discovery; fatal only
/// when the homepage itself is unreachable.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("http status {0}")]
    Status(u16),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },
}

/// Inference invocation failures, pre-classified so the analyzer can pick
/// the right backoff schedule without string matching.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("rate limited")]
    RateLimit,

    #[error("inference timeout after {0}ms")]
    Timeout(u64),

    #[error("inference process crashed: {0}")]
    ProcessCrash(String),

    #[error("invalid inference output: {0}")]
    InvalidOutput(String),

    #[error("url unreachable: {0}")]
    UrlUnreachable(String),

    #[error("inference failed: {0}")]
    Unknown(String),
}

impl InferenceError {
    pub fn code(&self) -> &'static str {
        match self {
            InferenceError::RateLimit => "RATE_LIMIT",
            InferenceError::Timeout(_) => "TIMEOUT",
            InferenceError::ProcessCrash(_) => "PROCESS_CRASH",
            InferenceError::InvalidOutput(_) => "INVALID_OUTPUT",
            InferenceError::UrlUnreachable(_) => "URL_UNREACHABLE",
            InferenceError::Unknown(_) => "UNKNOWN",
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, InferenceError::RateLimit)
    }
}
