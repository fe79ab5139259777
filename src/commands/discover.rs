use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use a11yscan_core::config::AppConfig;
use a11yscan_core::DiscoveryMode;
use a11yscan_clients::ReqwestFetcher;
use a11yscan_discovery::{DiscoveryEngine, DiscoveryService, DiscoverySubject};

use super::bootstrap;

pub async fn run(
    config: AppConfig,
    url: String,
    session: String,
    manual: bool,
    max_pages: Option<u32>,
    max_depth: Option<u32>,
) -> Result<()> {
    let (storage, _queue, cache) = bootstrap(&config).await?;
    let service = DiscoveryService::new(
        Arc::clone(&storage),
        cache.clone(),
        config.discovery.clone(),
    );

    let mode = if manual {
        DiscoveryMode::Manual
    } else {
        DiscoveryMode::Auto
    };
    let subject = DiscoverySubject::Session(session);
    let discovery = service
        .create(&subject, &url, mode, max_pages, max_depth)
        .await?;
    println!("discovery {} created for {}", discovery.id, discovery.homepage_url);

    if manual {
        println!("manual mode: add pages with `a11yscan add-urls {}`", discovery.id);
        return Ok(());
    }

    let fetcher = Arc::new(ReqwestFetcher::new(
        &config.discovery.user_agent,
        config.discovery.max_body_bytes,
    )?);
    let engine = DiscoveryEngine::new(
        Arc::clone(&storage),
        fetcher,
        cache,
        config.discovery.clone(),
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling discovery");
            signal_cancel.cancel();
        }
    });

    let finished = engine.run(discovery.id, cancel).await?;
    let pages = storage.list_pages(finished.id).await?;

    println!(
        "discovery {} finished: {} ({} pages{})",
        finished.id,
        finished.status.as_str(),
        pages.len(),
        if finished.partial_results { ", partial" } else { "" },
    );
    for page in pages {
        println!(
            "  [{}] depth={} {}",
            page.source.as_str(),
            page.depth,
            page.url
        );
    }
    Ok(())
}

pub async fn show(config: AppConfig, id: i64) -> Result<()> {
    let (storage, _queue, cache) = bootstrap(&config).await?;
    let service = DiscoveryService::new(Arc::clone(&storage), cache, config.discovery.clone());

    let snapshot = service.get_result(id).await?;
    let discovery = &snapshot.discovery;
    println!(
        "discovery {}: {} phase={} mode={} partial={}",
        discovery.id,
        discovery.status.as_str(),
        discovery.phase.as_str(),
        discovery.mode.as_str(),
        discovery.partial_results,
    );
    if let Some(code) = &discovery.error_code {
        println!("  error: {} {}", code, discovery.error_message.as_deref().unwrap_or(""));
    }
    for page in &snapshot.pages {
        println!(
            "  [{}] depth={} {} {}",
            page.source.as_str(),
            page.depth,
            page.url,
            page.title.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

pub async fn cancel(config: AppConfig, id: i64) -> Result<()> {
    let (storage, _queue, cache) = bootstrap(&config).await?;
    let service = DiscoveryService::new(storage, cache, config.discovery.clone());
    if service.cancel(id).await? {
        println!("cancellation requested for discovery {id}");
    } else {
        println!("discovery {id} is already finished");
    }
    Ok(())
}

pub async fn add_urls(config: AppConfig, discovery: i64, urls: Vec<String>) -> Result<()> {
    let (storage, _queue, cache) = bootstrap(&config).await?;
    let service = DiscoveryService::new(storage, cache, config.discovery.clone());

    for (url, result) in service.add_manual_pages(discovery, &urls).await {
        match result {
            Ok(page) => println!("added {}", page.url),
            Err(e) => println!("rejected {url}: {} ({})", e, e.code()),
        }
    }
    Ok(())
}

pub async fn remove_url(config: AppConfig, discovery: i64, url: String) -> Result<()> {
    let (storage, _queue, cache) = bootstrap(&config).await?;
    let service = DiscoveryService::new(storage, cache, config.discovery.clone());
    if service.remove_manual_page(discovery, &url).await? {
        println!("removed {url}");
    } else {
        println!("no manual page {url} in discovery {discovery}");
    }
    Ok(())
}
