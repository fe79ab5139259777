mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc keeps worker memory flat under sustained crawl/scan load
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use a11yscan_core::config::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;
    apply_env_overrides(&mut config);

    match cli.command {
        Commands::Discover {
            url,
            session,
            manual,
            max_pages,
            max_depth,
        } => commands::discover::run(config, url, session, manual, max_pages, max_depth).await,
        Commands::ShowDiscovery { id } => commands::discover::show(config, id).await,
        Commands::CancelDiscovery { id } => commands::discover::cancel(config, id).await,
        Commands::AddUrls { discovery, urls } => {
            commands::discover::add_urls(config, discovery, urls).await
        }
        Commands::RemoveUrl { discovery, url } => {
            commands::discover::remove_url(config, discovery, url).await
        }
        Commands::Scan {
            url,
            level,
            email,
            ai,
            session,
        } => commands::scan::run(config, url, level, email, ai, session).await,
        Commands::Batch {
            homepage,
            urls,
            level,
            email,
            ai,
            session,
        } => commands::scan::batch(config, homepage, urls, level, email, ai, session).await,
        Commands::Scans { session, limit } => commands::scan::list(config, session, limit).await,
        Commands::Batches { session, limit } => {
            commands::scan::list_batches(config, session, limit).await
        }
        Commands::ShowReport { id } => commands::scan::show_report(config, id).await,
        Commands::Report {
            scan,
            batch,
            format,
        } => commands::scan::report(config, scan, batch, format).await,
        Commands::Work {
            queues,
            concurrency,
        } => commands::work::run(config, queues, concurrency).await,
        Commands::Analyze {
            scan,
            limit,
            parallel,
            results_out,
        } => commands::analyze::run(config, scan, limit, parallel, results_out).await,
        Commands::Backlog { output, limit } => {
            commands::analyze::export_backlog(config, output, limit).await
        }
        Commands::Queues { command } => commands::queues::run(config, command).await,
        Commands::Delete { entity, id } => commands::status::delete(config, entity, id).await,
        Commands::Status => commands::status::run(config).await,
    }
}

/// Environment overrides for deployment tuning. Only these keys are
/// recognized; anything else belongs in the config file.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = std::env::var("DATABASE_URL") {
        config.database.postgres_url = v;
    }
    if let Ok(v) = std::env::var("APP_URL") {
        config.general.app_url = v;
    }
    if let Ok(v) = std::env::var("WORKER_CONCURRENCY") {
        if let Some(n) = v.parse::<usize>().ok().filter(|&n| n > 0 && n <= 128) {
            config.general.worker_concurrency = n;
        }
    }
    if let Ok(v) = std::env::var("SMTP_URL") {
        config.email.smtp_url = v;
    }
    if let Ok(v) = std::env::var("EMAIL_FROM") {
        config.email.from_address = v;
    }
    if let Ok(v) = std::env::var("DISCOVERY_MONTHLY_LIMIT") {
        if let Ok(n) = v.parse::<u32>() {
            config.discovery.monthly_limit = n;
        }
    }
    if let Ok(v) = std::env::var("FAST_SCAN_EMAIL_THRESHOLD_MS") {
        if let Ok(n) = v.parse::<i64>() {
            config.email.fast_scan_threshold_ms = n;
        }
    }
    if let Ok(v) = std::env::var("AI_BATCH_SIZE") {
        if let Ok(n) = v.parse::<usize>() {
            config.ai.batch_size = n;
        }
    }
    if let Ok(v) = std::env::var("AI_MINI_BATCH_SIZE") {
        if let Ok(n) = v.parse::<usize>() {
            config.ai.mini_batch_size = n;
        }
    }
    if let Ok(v) = std::env::var("AI_DELAY_SECONDS") {
        if let Ok(n) = v.parse::<u64>() {
            config.ai.delay_seconds = n;
        }
    }
    if let Ok(v) = std::env::var("AI_TIMEOUT_MS") {
        if let Ok(n) = v.parse::<u64>() {
            config.ai.timeout_ms = n;
        }
    }
    if let Ok(v) = std::env::var("AI_RETRIES") {
        if let Ok(n) = v.parse::<u32>() {
            config.ai.retries = n;
        }
    }
    if let Ok(v) = std::env::var("INFERENCE_URL") {
        config.ai.inference_url = v;
    }
    if let Ok(v) = std::env::var("INFERENCE_MODEL") {
        config.ai.inference_model = v;
    }
    if let Ok(v) = std::env::var("INFERENCE_API_KEY") {
        config.ai.inference_api_key = Some(v);
    }
}
