use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use a11yscan_core::collaborators::HtmlFetcher;
use a11yscan_parser::sitemap::{parse_sitemap, SitemapDocument, SitemapEntry};
use a11yscan_parser::url_rules::{is_same_domain, validate};

use crate::politeness::Politeness;

#[derive(Debug, Default)]
pub struct ResolvedSitemaps {
    pub entries: Vec<SitemapEntry>,
    /// Fetch or parse problems survived along the way; the discovery
    /// records these as partial results.
    pub errors: u32,
}

/// Fetches and walks sitemap documents for one homepage. Child sitemaps on
/// a different domain are never fetched — a hostile sitemapindex must not
/// turn the crawler into a proxy.
pub struct SitemapResolver {
    fetcher: Arc<dyn HtmlFetcher>,
    politeness: Arc<Politeness>,
    fetch_timeout: Duration,
    max_bytes: usize,
    max_urls: usize,
    /// Ceiling on index recursion. A fourth level of sitemap indirection
    /// yields nothing.
    max_depth: u32,
}

impl SitemapResolver {
    pub fn new(
        fetcher: Arc<dyn HtmlFetcher>,
        politeness: Arc<Politeness>,
        fetch_timeout: Duration,
        max_bytes: usize,
        max_urls: usize,
        max_depth: u32,
    ) -> Self {
        Self {
            fetcher,
            politeness,
            fetch_timeout,
            max_bytes,
            max_urls,
            max_depth,
        }
    }

    pub async fn resolve(&self, seeds: &[String], homepage: &str) -> ResolvedSitemaps {
        let mut result = ResolvedSitemaps::default();
        let mut visited: HashSet<String> = HashSet::new();
        // (url, depth) work list; depth counts index indirection.
        let mut pending: Vec<(String, u32)> = seeds.iter().map(|s| (s.clone(), 0)).collect();

        while let Some((sitemap_url, depth)) = pending.pop() {
            if result.entries.len() >= self.max_urls {
                break;
            }
            if !visited.insert(sitemap_url.clone()) {
                continue;
            }

            // SSRF guard: never fetch a sitemap outside the homepage's domain.
            if !is_same_domain(&sitemap_url, homepage) {
                debug!(url = %sitemap_url, "skipping off-domain sitemap");
                continue;
            }
            let url = match validate(&sitemap_url, homepage) {
                Ok(url) => url,
                Err(e) => {
                    debug!(url = %sitemap_url, code = e.code(), "sitemap url rejected");
                    continue;
                }
            };

            if let Some(host) = url.host_str() {
                self.politeness.acquire(host).await;
            }
            let response = match self.fetcher.fetch(&url, self.fetch_timeout).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(url = %url, "sitemap fetch failed: {e}");
                    result.errors += 1;
                    continue;
                }
            };
            if response.status >= 400 {
                debug!(url = %url, status = response.status, "sitemap not available");
                continue;
            }
            if response.body.len() > self.max_bytes {
                warn!(url = %url, size = response.body.len(), "sitemap over size ceiling, skipped");
                continue;
            }

            match parse_sitemap(&response.body_text()) {
                SitemapDocument::Index(children) => {
                    if depth + 1 > self.max_depth {
                        debug!(url = %url, "sitemap index past max depth, children dropped");
                        continue;
                    }
                    for child in children {
                        pending.push((child, depth + 1));
                    }
                }
                SitemapDocument::UrlSet(entries) => {
                    for entry in entries {
                        if result.entries.len() >= self.max_urls {
                            break;
                        }
                        if !is_same_domain(&entry.url, homepage) {
                            continue;
                        }
                        result.entries.push(entry);
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use url::Url;

    use a11yscan_core::collaborators::FetchResponse;
    use a11yscan_core::FetchError;

    /// Canned-response fetcher that records every URL it is asked for.
    struct FakeFetcher {
        responses: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(responses: &[(&str, &str)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn fetched_urls(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HtmlFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchError> {
            self.fetched.lock().unwrap().push(url.to_string());
            match self.responses.get(url.as_str()) {
                Some(body) => Ok(FetchResponse {
                    final_url: url.clone(),
                    status: 200,
                    headers: HashMap::new(),
                    body: body.clone().into_bytes(),
                    content_type: Some("application/xml".into()),
                }),
                None => Err(FetchError::Network("no canned response".into())),
            }
        }
    }

    fn resolver(fetcher: Arc<FakeFetcher>) -> SitemapResolver {
        SitemapResolver::new(
            fetcher,
            Arc::new(Politeness::new(Duration::from_millis(0))),
            Duration::from_secs(30),
            5 * 1024 * 1024,
            50_000,
            3,
        )
    }

    #[tokio::test]
    async fn resolves_urlset_entries_on_the_same_domain() {
        let fetcher = Arc::new(FakeFetcher::new(&[(
            "https://example.com/sitemap.xml",
            r#"<urlset>
                <url><loc>https://example.com/</loc></url>
                <url><loc>https://example.com/about</loc></url>
                <url><loc>https://elsewhere.com/skip-me</loc></url>
            </urlset>"#,
        )]));
        let result = resolver(Arc::clone(&fetcher))
            .resolve(
                &["https://example.com/sitemap.xml".to_string()],
                "https://example.com",
            )
            .await;

        let urls: Vec<&str> = result.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/about"]);
        assert_eq!(result.errors, 0);
    }

    #[tokio::test]
    async fn never_fetches_off_domain_child_sitemaps() {
        let fetcher = Arc::new(FakeFetcher::new(&[(
            "https://example.com/sitemap.xml",
            r#"<sitemapindex>
                <sitemap><loc>https://evil.com/sitemap.xml</loc></sitemap>
            </sitemapindex>"#,
        )]));
        let result = resolver(Arc::clone(&fetcher))
            .resolve(
                &["https://example.com/sitemap.xml".to_string()],
                "https://example.com",
            )
            .await;

        assert!(result.entries.is_empty());
        let fetched = fetcher.fetched_urls();
        assert!(
            fetched.iter().all(|u| !u.contains("evil.com")),
            "fetched: {fetched:?}"
        );
    }

    #[tokio::test]
    async fn follows_index_children_on_the_same_domain() {
        let fetcher = Arc::new(FakeFetcher::new(&[
            (
                "https://example.com/sitemap.xml",
                r#"<sitemapindex>
                    <sitemap><loc>https://example.com/sitemap-pages.xml</loc></sitemap>
                </sitemapindex>"#,
            ),
            (
                "https://example.com/sitemap-pages.xml",
                r#"<urlset><url><loc>https://example.com/contact</loc></url></urlset>"#,
            ),
        ]));
        let result = resolver(Arc::clone(&fetcher))
            .resolve(
                &["https://example.com/sitemap.xml".to_string()],
                "https://example.com",
            )
            .await;

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].url, "https://example.com/contact");
    }

    #[tokio::test]
    async fn recursion_stops_at_the_depth_ceiling() {
        // Four levels of index; the last hop must be dropped.
        let fetcher = Arc::new(FakeFetcher::new(&[
            (
                "https://example.com/s0.xml",
                r#"<sitemapindex><sitemap><loc>https://example.com/s1.xml</loc></sitemap></sitemapindex>"#,
            ),
            (
                "https://example.com/s1.xml",
                r#"<sitemapindex><sitemap><loc>https://example.com/s2.xml</loc></sitemap></sitemapindex>"#,
            ),
            (
                "https://example.com/s2.xml",
                r#"<sitemapindex><sitemap><loc>https://example.com/s3.xml</loc></sitemap></sitemapindex>"#,
            ),
            (
                "https://example.com/s3.xml",
                r#"<sitemapindex><sitemap><loc>https://example.com/s4.xml</loc></sitemap></sitemapindex>"#,
            ),
            (
                "https://example.com/s4.xml",
                r#"<urlset><url><loc>https://example.com/too-deep</loc></url></urlset>"#,
            ),
        ]));
        let result = resolver(Arc::clone(&fetcher))
            .resolve(
                &["https://example.com/s0.xml".to_string()],
                "https://example.com",
            )
            .await;

        assert!(result.entries.is_empty());
        assert!(!fetcher
            .fetched_urls()
            .contains(&"https://example.com/s4.xml".to_string()));
    }

    #[tokio::test]
    async fn url_ceiling_terminates_quietly() {
        let body: String = (0..20)
            .map(|i| format!("<url><loc>https://example.com/p{i}</loc></url>"))
            .collect();
        let fetcher = Arc::new(FakeFetcher::new(&[(
            "https://example.com/sitemap.xml",
            &format!("<urlset>{body}</urlset>"),
        )]));
        let resolver = SitemapResolver::new(
            fetcher,
            Arc::new(Politeness::new(Duration::from_millis(0))),
            Duration::from_secs(30),
            5 * 1024 * 1024,
            5,
            3,
        );
        let result = resolver
            .resolve(
                &["https://example.com/sitemap.xml".to_string()],
                "https://example.com",
            )
            .await;

        assert_eq!(result.entries.len(), 5);
        assert_eq!(result.errors, 0);
    }

    #[tokio::test]
    async fn fetch_failures_are_counted_not_fatal() {
        let fetcher = Arc::new(FakeFetcher::new(&[]));
        let result = resolver(fetcher)
            .resolve(
                &["https://example.com/sitemap.xml".to_string()],
                "https://example.com",
            )
            .await;
        assert!(result.entries.is_empty());
        assert_eq!(result.errors, 1);
    }
}
