use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use a11yscan_cache::{DiscoverySnapshot, ResultCache};
use a11yscan_core::collaborators::HtmlFetcher;
use a11yscan_core::config::DiscoveryConfig;
use a11yscan_core::{
    Discovery, DiscoveryPhase, DiscoveryStatus, PageSource, ServiceError,
};
use a11yscan_parser::navigation::{extract_navigation_links, extract_title};
use a11yscan_parser::robots::RobotsRules;
use a11yscan_parser::url_rules::{canonicalize, validate};
use a11yscan_storage::Storage;

use crate::politeness::Politeness;
use crate::sitemap_resolver::SitemapResolver;

/// Drives one discovery through its phases:
///
/// ```text
/// PENDING -> RUNNING{SITEMAP} -> RUNNING{NAVIGATION} -> RUNNING{CRAWL}
///         -> COMPLETED | FAILED | CANCELLED
/// ```
///
/// The engine is the discovery row's single writer. Per-fetch errors are
/// absorbed into `partial_results`; only an unreachable homepage fails the
/// whole discovery.
pub struct DiscoveryEngine {
    storage: Arc<Storage>,
    fetcher: Arc<dyn HtmlFetcher>,
    cache: ResultCache,
    config: DiscoveryConfig,
}

struct FetchOutcome {
    page_id: i64,
    depth: u32,
    http_status: Option<u16>,
    content_type: Option<String>,
    title: Option<String>,
    child_urls: Vec<String>,
    errored: bool,
}

impl DiscoveryEngine {
    pub fn new(
        storage: Arc<Storage>,
        fetcher: Arc<dyn HtmlFetcher>,
        cache: ResultCache,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            storage,
            fetcher,
            cache,
            config,
        }
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.fetch_timeout_seconds)
    }

    pub async fn run(
        &self,
        discovery_id: i64,
        cancel: CancellationToken,
    ) -> Result<Discovery, ServiceError> {
        let discovery = self
            .storage
            .get_discovery(discovery_id)
            .await?
            .ok_or(ServiceError::DiscoveryNotFound(discovery_id))?;

        if !self.storage.mark_discovery_running(discovery_id).await? {
            return match discovery.status {
                DiscoveryStatus::Cancelled => Err(ServiceError::DiscoveryCancelled(discovery_id)),
                _ => Err(ServiceError::DiscoveryAlreadyRunning(discovery_id)),
            };
        }

        info!(discovery_id, homepage = %discovery.homepage_url, "discovery started");
        let homepage = discovery.homepage_url.clone();
        let mut partial = false;
        // First phase error code, surfaced on the finished row when the
        // discovery completes with partial results.
        let mut partial_code: Option<&'static str> = None;
        let mut pages_known = self.storage.count_pages(discovery_id).await? as u32;

        // robots.txt steers both the sitemap seeds and the request spacing.
        let robots = self.fetch_robots(&homepage).await;
        let politeness = Arc::new(Politeness::with_crawl_delay(
            Duration::from_millis(self.config.min_origin_delay_ms),
            robots.crawl_delay_seconds,
        ));

        // --- SITEMAP phase ---
        if self.should_stop(discovery_id, &cancel).await? {
            return self.finish_cancelled(discovery_id, partial).await;
        }
        let mut seen: HashSet<String> = self
            .storage
            .list_pages(discovery_id)
            .await?
            .into_iter()
            .map(|p| p.url)
            .collect();
        let sitemap_errors = self
            .run_sitemap_phase(
                discovery_id,
                &homepage,
                &robots,
                Arc::clone(&politeness),
                &mut seen,
                &mut pages_known,
            )
            .await?;
        if sitemap_errors {
            partial = true;
            partial_code = partial_code.or(Some("SITEMAP_FETCH_FAILED"));
        }

        // --- NAVIGATION phase ---
        if self.should_stop(discovery_id, &cancel).await? {
            return self.finish_cancelled(discovery_id, partial).await;
        }
        self.storage
            .set_discovery_phase(discovery_id, DiscoveryPhase::Navigation)
            .await?;

        let homepage_url = validate(&homepage, &homepage)?;
        if let Some(host) = homepage_url.host_str() {
            politeness.acquire(host).await;
        }
        let homepage_html = match self.fetcher.fetch(&homepage_url, self.fetch_timeout()).await {
            Ok(response) => response.body_text(),
            Err(e) => {
                warn!(discovery_id, homepage = %homepage, "homepage unreachable: {e}");
                self.storage
                    .finish_discovery(
                        discovery_id,
                        DiscoveryStatus::Failed,
                        pages_known > 0,
                        Some("URL_UNREACHABLE"),
                        Some(&format!("homepage unreachable: {e}")),
                    )
                    .await?;
                return self.load(discovery_id).await;
            }
        };

        let max_pages = discovery.max_pages;
        let nav_links = extract_navigation_links(&homepage_html, &homepage_url);
        debug!(discovery_id, links = nav_links.len(), "navigation links extracted");
        for link in &nav_links {
            if pages_known >= max_pages {
                break;
            }
            if !seen.insert(link.url.clone()) {
                continue;
            }
            if self
                .storage
                .insert_page(
                    discovery_id,
                    &link.url,
                    link.text.as_deref(),
                    PageSource::Navigation,
                    1,
                    None,
                    None,
                )
                .await?
                .is_some()
            {
                pages_known += 1;
            }
        }

        // --- CRAWL phase ---
        if self.should_stop(discovery_id, &cancel).await? {
            return self.finish_cancelled(discovery_id, partial).await;
        }
        self.storage
            .set_discovery_phase(discovery_id, DiscoveryPhase::Crawl)
            .await?;
        let crawl_errors = self
            .run_crawl_phase(&discovery, Arc::clone(&politeness), &mut seen, &mut pages_known, &cancel)
            .await?;
        if crawl_errors {
            partial = true;
            partial_code = partial_code.or(Some("NAVIGATION_EXTRACTION_FAILED"));
        }

        if self.should_stop(discovery_id, &cancel).await? {
            return self.finish_cancelled(discovery_id, partial).await;
        }

        self.storage
            .finish_discovery(
                discovery_id,
                DiscoveryStatus::Completed,
                partial,
                partial_code,
                None,
            )
            .await?;
        let finished = self.load(discovery_id).await?;
        self.publish_snapshot(&finished).await;
        info!(discovery_id, pages = pages_known, partial, "discovery completed");
        Ok(finished)
    }

    async fn fetch_robots(&self, homepage: &str) -> RobotsRules {
        let Ok(base) = url::Url::parse(homepage) else {
            return RobotsRules::default();
        };
        let Ok(robots_url) = base.join("/robots.txt") else {
            return RobotsRules::default();
        };
        match self.fetcher.fetch(&robots_url, self.fetch_timeout()).await {
            Ok(response) if response.status < 400 => {
                RobotsRules::parse(&response.body_text(), &self.config.user_agent)
            }
            Ok(_) => RobotsRules::default(),
            Err(e) => {
                debug!(url = %robots_url, "robots.txt not fetched: {e}");
                RobotsRules::default()
            }
        }
    }

    async fn run_sitemap_phase(
        &self,
        discovery_id: i64,
        homepage: &str,
        robots: &RobotsRules,
        politeness: Arc<Politeness>,
        seen: &mut HashSet<String>,
        pages_known: &mut u32,
    ) -> Result<bool, ServiceError> {
        let discovery = self.load(discovery_id).await?;

        let mut seeds: Vec<String> = robots.sitemap_urls.clone();
        if let Ok(base) = url::Url::parse(homepage) {
            if let Ok(fallback) = base.join("/sitemap.xml") {
                let fallback = fallback.to_string();
                if !seeds.contains(&fallback) {
                    seeds.push(fallback);
                }
            }
        }

        let resolver = SitemapResolver::new(
            Arc::clone(&self.fetcher),
            politeness,
            self.fetch_timeout(),
            self.config.sitemap_max_bytes,
            self.config.sitemap_max_urls,
            self.config.sitemap_max_depth,
        );
        let resolved = resolver.resolve(&seeds, homepage).await;
        let mut partial = resolved.errors > 0;

        for entry in resolved.entries {
            if *pages_known >= discovery.max_pages {
                break;
            }
            let canonical = match validate(&entry.url, homepage) {
                Ok(_) => canonicalize(&entry.url),
                Err(e) => {
                    debug!(discovery_id, url = %entry.url, code = e.code(), "sitemap entry rejected");
                    continue;
                }
            };
            if !seen.insert(canonical.clone()) {
                continue;
            }
            match self
                .storage
                .insert_page(
                    discovery_id,
                    &canonical,
                    None,
                    PageSource::Sitemap,
                    0,
                    None,
                    None,
                )
                .await
            {
                Ok(Some(_)) => *pages_known += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(discovery_id, url = %canonical, "page insert failed: {e}");
                    partial = true;
                }
            }
        }

        debug!(discovery_id, pages = *pages_known, partial, "sitemap phase done");
        Ok(partial)
    }

    /// Bounded BFS over every known page. Each fetch re-validates its URL,
    /// waits for its origin slot, and contributes child links at
    /// `depth + 1` until the page or depth budget runs out.
    async fn run_crawl_phase(
        &self,
        discovery: &Discovery,
        politeness: Arc<Politeness>,
        seen: &mut HashSet<String>,
        pages_known: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<bool, ServiceError> {
        let discovery_id = discovery.id;
        let homepage = discovery.homepage_url.clone();
        let max_depth = discovery.max_depth;
        let max_pages = discovery.max_pages;
        let mut partial = false;

        let mut frontier: VecDeque<(i64, String, u32)> = self
            .storage
            .list_pages(discovery_id)
            .await?
            .into_iter()
            .map(|p| (p.id, p.url, p.depth))
            .collect();

        let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();
        let mut cancelled = false;

        loop {
            while in_flight.len() < self.config.max_concurrent_fetches && !cancelled {
                let Some((page_id, page_url, depth)) = frontier.pop_front() else {
                    break;
                };

                // Safety: re-validate immediately before the fetch; a bad
                // URL is dropped, never fatal.
                let url = match validate(&page_url, &homepage) {
                    Ok(url) => url,
                    Err(e) => {
                        debug!(discovery_id, url = %page_url, code = e.code(), "crawl url rejected");
                        continue;
                    }
                };

                let fetcher = Arc::clone(&self.fetcher);
                let politeness = Arc::clone(&politeness);
                let timeout = self.fetch_timeout();
                let homepage = homepage.clone();
                in_flight.spawn(async move {
                    if let Some(host) = url.host_str() {
                        politeness.acquire(host).await;
                    }
                    match fetcher.fetch(&url, timeout).await {
                        Ok(response) => {
                            let html = response.is_html().then(|| response.body_text());
                            let (title, child_urls) = match &html {
                                Some(html) => {
                                    let links = extract_navigation_links(html, &url)
                                        .into_iter()
                                        .filter(|l| {
                                            a11yscan_parser::url_rules::is_same_domain(
                                                &l.url, &homepage,
                                            )
                                        })
                                        .map(|l| l.url)
                                        .collect();
                                    (extract_title(html), links)
                                }
                                None => (None, Vec::new()),
                            };
                            FetchOutcome {
                                page_id,
                                depth,
                                http_status: Some(response.status),
                                content_type: response.content_type.clone(),
                                title,
                                child_urls,
                                errored: false,
                            }
                        }
                        Err(e) => {
                            debug!(url = %url, "crawl fetch failed: {e}");
                            FetchOutcome {
                                page_id,
                                depth,
                                http_status: None,
                                content_type: None,
                                title: None,
                                child_urls: Vec::new(),
                                errored: true,
                            }
                        }
                    }
                });
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                }
                Some(joined) = in_flight.join_next() => {
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(discovery_id, "crawl task panicked: {e}");
                            partial = true;
                            continue;
                        }
                    };

                    if outcome.errored {
                        partial = true;
                        continue;
                    }

                    self.storage
                        .update_page_fetch_result(
                            outcome.page_id,
                            outcome.http_status,
                            outcome.content_type.as_deref(),
                            outcome.title.as_deref(),
                        )
                        .await?;

                    let child_depth = outcome.depth + 1;
                    if child_depth > max_depth {
                        continue;
                    }
                    for child in outcome.child_urls {
                        if *pages_known >= max_pages {
                            break;
                        }
                        let canonical = canonicalize(&child);
                        if !seen.insert(canonical.clone()) {
                            continue;
                        }
                        if let Some(page_id) = self
                            .storage
                            .insert_page(
                                discovery_id,
                                &canonical,
                                None,
                                PageSource::Crawled,
                                child_depth,
                                None,
                                None,
                            )
                            .await?
                        {
                            *pages_known += 1;
                            frontier.push_back((page_id, canonical, child_depth));
                        }
                    }
                }
            }

            if !cancelled && self.storage.is_discovery_cancel_requested(discovery_id).await? {
                cancelled = true;
            }
        }

        if cancelled {
            cancel.cancel();
        }
        debug!(discovery_id, pages = *pages_known, partial, "crawl phase done");
        Ok(partial)
    }

    async fn should_stop(
        &self,
        discovery_id: i64,
        cancel: &CancellationToken,
    ) -> Result<bool, ServiceError> {
        if cancel.is_cancelled() {
            return Ok(true);
        }
        Ok(self.storage.is_discovery_cancel_requested(discovery_id).await?)
    }

    async fn finish_cancelled(
        &self,
        discovery_id: i64,
        partial: bool,
    ) -> Result<Discovery, ServiceError> {
        info!(discovery_id, "discovery cancelled");
        self.storage
            .finish_discovery(
                discovery_id,
                DiscoveryStatus::Cancelled,
                partial,
                Some("DISCOVERY_CANCELLED"),
                None,
            )
            .await?;
        self.load(discovery_id).await
    }

    async fn load(&self, discovery_id: i64) -> Result<Discovery, ServiceError> {
        self.storage
            .get_discovery(discovery_id)
            .await?
            .ok_or(ServiceError::DiscoveryNotFound(discovery_id))
    }

    /// Cache publication is best-effort and never fails the discovery.
    async fn publish_snapshot(&self, discovery: &Discovery) {
        match self.storage.list_pages(discovery.id).await {
            Ok(pages) => {
                self.cache
                    .put_discovery(&DiscoverySnapshot {
                        discovery: discovery.clone(),
                        pages,
                        cached_at: Utc::now(),
                    })
                    .await;
            }
            Err(e) => warn!(discovery_id = discovery.id, "snapshot load failed: {e}"),
        }
    }
}
