use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "a11yscan", about = "Accessibility scanning platform: discovery, scans, AI analysis")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover the reachable pages of a site, starting at its homepage
    Discover {
        /// Homepage URL to start from
        url: String,

        /// Session the discovery is charged to
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// Manual mode: create the discovery without crawling
        #[arg(long)]
        manual: bool,

        /// Page cap for this discovery
        #[arg(long)]
        max_pages: Option<u32>,

        /// Depth cap for the crawl phase
        #[arg(long)]
        max_depth: Option<u32>,
    },
    /// Show a discovery and its pages
    ShowDiscovery {
        id: i64,
    },
    /// Request cancellation of a running discovery
    CancelDiscovery {
        id: i64,
    },
    /// Add manual URLs to a discovery
    AddUrls {
        discovery: i64,
        /// URLs to add
        urls: Vec<String>,
    },
    /// Remove a manual URL from a discovery
    RemoveUrl {
        discovery: i64,
        url: String,
    },
    /// Queue a single-page accessibility scan
    Scan {
        url: String,

        /// Conformance level: A, AA, or AAA
        #[arg(short, long, default_value = "AA")]
        level: String,

        /// Email the result to this address (cleared after delivery)
        #[arg(short, long)]
        email: Option<String>,

        /// Queue AI verification after the scan
        #[arg(long)]
        ai: bool,

        #[arg(short, long, default_value = "cli")]
        session: String,
    },
    /// Queue a batch scan over many pages of one site
    Batch {
        homepage: String,

        /// Page URLs (or a file path with one URL per line)
        urls: Vec<String>,

        #[arg(short, long, default_value = "AA")]
        level: String,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        ai: bool,

        #[arg(short, long, default_value = "cli")]
        session: String,
    },
    /// List recent scans
    Scans {
        /// Only scans charged to this session
        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// List recent batch scans
    Batches {
        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show a report artifact's status and URL
    ShowReport {
        id: i64,
    },
    /// Request an export artifact for a scan or batch
    Report {
        /// Scan to export
        #[arg(long, conflicts_with = "batch")]
        scan: Option<i64>,

        /// Batch to export
        #[arg(long)]
        batch: Option<i64>,

        /// pdf, json, or csv (csv prints synchronously)
        #[arg(short, long, default_value = "json")]
        format: String,
    },
    /// Run queue workers until interrupted
    Work {
        /// Queues to serve (default: all)
        #[arg(short, long, value_delimiter = ',')]
        queues: Option<Vec<String>>,

        /// Concurrency for the scan-page queue
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Run AI analysis over the backlog (or one scan)
    Analyze {
        /// Analyze a single scan instead of the backlog
        #[arg(long)]
        scan: Option<i64>,

        /// Max scans pulled from the backlog
        #[arg(long, default_value = "50")]
        limit: i64,

        /// Scans analyzed in parallel
        #[arg(long, default_value = "2")]
        parallel: usize,

        /// Write per-scan verification results to this CSV
        #[arg(long)]
        results_out: Option<String>,
    },
    /// Export the pending AI backlog as CSV
    Backlog {
        /// Output file
        #[arg(short, long, default_value = "backlog.csv")]
        output: String,

        #[arg(long, default_value = "500")]
        limit: i64,
    },
    /// Inspect and administer the job queues
    Queues {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Delete stored data for a scan, batch, or discovery
    Delete {
        /// scan, batch, or discovery
        entity: String,
        id: i64,
    },
    /// Show platform status and queue depths
    Status,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Show per-queue job counts
    List,
    /// Show permanently failed jobs
    Failed {
        queue: String,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Requeue permanently failed jobs
    Retry {
        queue: String,
    },
}
