use once_cell::sync::Lazy;
use regex::Regex;

/// One `<url>` entry from a urlset document.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub url: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    /// Decimal in [0,1]; string content is accepted, anything unparsable
    /// or out of range is dropped.
    pub priority: Option<f64>,
}

/// A sitemap document is either a page list or an index of child sitemaps.
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    UrlSet(Vec<SitemapEntry>),
    Index(Vec<String>),
}

static URL_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<url\b[^>]*>(.*?)</url>").unwrap());
static SITEMAP_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<sitemap\b[^>]*>(.*?)</sitemap>").unwrap());
static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<loc>\s*([^<]+?)\s*</loc>").unwrap());
static LASTMOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<lastmod>\s*([^<]+?)\s*</lastmod>").unwrap());
static CHANGEFREQ_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<changefreq>\s*([^<]+?)\s*</changefreq>").unwrap());
static PRIORITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<priority>\s*([^<]+?)\s*</priority>").unwrap());

fn capture(re: &Regex, block: &str) -> Option<String> {
    re.captures(block).map(|c| c[1].trim().to_string())
}

fn parse_priority(block: &str) -> Option<f64> {
    let raw = capture(&PRIORITY_RE, block)?;
    let value = raw.trim_matches('"').parse::<f64>().ok()?;
    if (0.0..=1.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Parse sitemap XML. Recognizes both `<urlset>` and `<sitemapindex>`;
/// anything else yields an empty urlset. Tolerant of namespaces and
/// whitespace — the subset of sitemaps.org actually seen in the wild.
pub fn parse_sitemap(xml: &str) -> SitemapDocument {
    if xml.contains("<sitemapindex") {
        let children = SITEMAP_BLOCK_RE
            .captures_iter(xml)
            .filter_map(|c| capture(&LOC_RE, &c[1]))
            .collect();
        return SitemapDocument::Index(children);
    }

    let entries = URL_BLOCK_RE
        .captures_iter(xml)
        .filter_map(|c| {
            let block = &c[1];
            let url = capture(&LOC_RE, block)?;
            Some(SitemapEntry {
                url,
                lastmod: capture(&LASTMOD_RE, block),
                changefreq: capture(&CHANGEFREQ_RE, block),
                priority: parse_priority(block),
            })
        })
        .collect();
    SitemapDocument::UrlSet(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_entries() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/</loc>
    <lastmod>2026-01-15</lastmod>
    <changefreq>daily</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc> https://example.com/about </loc>
  </url>
</urlset>"#;

        let SitemapDocument::UrlSet(entries) = parse_sitemap(xml) else {
            panic!("expected urlset");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.com/");
        assert_eq!(entries[0].lastmod.as_deref(), Some("2026-01-15"));
        assert_eq!(entries[0].changefreq.as_deref(), Some("daily"));
        assert_eq!(entries[0].priority, Some(0.8));
        assert_eq!(entries[1].url, "https://example.com/about");
        assert_eq!(entries[1].priority, None);
    }

    #[test]
    fn parses_sitemap_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/sitemap-pages.xml</loc></sitemap>
  <sitemap><loc>https://example.com/sitemap-blog.xml</loc><lastmod>2026-02-01</lastmod></sitemap>
</sitemapindex>"#;

        let SitemapDocument::Index(children) = parse_sitemap(xml) else {
            panic!("expected index");
        };
        assert_eq!(
            children,
            vec![
                "https://example.com/sitemap-pages.xml".to_string(),
                "https://example.com/sitemap-blog.xml".to_string(),
            ]
        );
    }

    #[test]
    fn priority_accepts_strings_and_drops_out_of_range() {
        let xml = |p: &str| {
            format!(
                "<urlset><url><loc>https://example.com/a</loc><priority>{p}</priority></url></urlset>"
            )
        };
        let first = |doc: SitemapDocument| match doc {
            SitemapDocument::UrlSet(mut v) => v.remove(0),
            _ => panic!("expected urlset"),
        };

        assert_eq!(first(parse_sitemap(&xml("0.5"))).priority, Some(0.5));
        assert_eq!(first(parse_sitemap(&xml("\"0.5\""))).priority, Some(0.5));
        assert_eq!(first(parse_sitemap(&xml("1.5"))).priority, None);
        assert_eq!(first(parse_sitemap(&xml("high"))).priority, None);
    }

    #[test]
    fn entries_without_loc_are_skipped() {
        let xml = "<urlset><url><lastmod>2026-01-01</lastmod></url></urlset>";
        let SitemapDocument::UrlSet(entries) = parse_sitemap(xml) else {
            panic!("expected urlset");
        };
        assert!(entries.is_empty());
    }

    #[test]
    fn garbage_is_an_empty_urlset() {
        let SitemapDocument::UrlSet(entries) = parse_sitemap("not xml") else {
            panic!("expected urlset");
        };
        assert!(entries.is_empty());
    }
}
