use scraper::{Html, Selector};
use url::Url;

use crate::url_rules::{canonicalize, is_same_domain};

/// A same-domain link pulled from a landmark navigation region.
#[derive(Debug, Clone, PartialEq)]
pub struct NavLink {
    pub url: String,
    pub text: Option<String>,
}

/// Landmark regions in priority order. Semantic markup first, then the
/// class-based conventions, then footer navigation.
const LANDMARK_SELECTORS: &[&str] = &[
    "nav",
    "[role=\"navigation\"]",
    "header nav",
    ".nav",
    ".menu",
    "footer nav",
];

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Document title, trimmed, whitespace-collapsed, control characters
/// stripped, and capped at 500 characters.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = selector("title")?;
    let raw = document.select(&sel).next()?.text().collect::<String>();
    let cleaned: String = collapse_whitespace(&raw)
        .chars()
        .filter(|c| !c.is_control())
        .take(500)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Extract in-domain links from the landmark regions of a homepage.
/// Ties across regions resolve to the first occurrence; URLs come back
/// canonical, fragment-free, and deduplicated.
pub fn extract_navigation_links(html: &str, homepage: &Url) -> Vec<NavLink> {
    let document = Html::parse_document(html);
    let homepage_str = homepage.as_str();
    let anchor = match selector("a[href]") {
        Some(s) => s,
        None => return Vec::new(),
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for landmark in LANDMARK_SELECTORS {
        let Some(sel) = selector(landmark) else {
            continue;
        };
        for region in document.select(&sel) {
            for el in region.select(&anchor) {
                let Some(href) = el.value().attr("href") else {
                    continue;
                };
                let href = href.trim();
                if href.is_empty() || href.starts_with('#') {
                    continue;
                }

                let Ok(mut resolved) = homepage.join(href) else {
                    continue;
                };
                resolved.set_fragment(None);

                if !matches!(resolved.scheme(), "http" | "https") {
                    continue;
                }
                if !is_same_domain(resolved.as_str(), homepage_str) {
                    continue;
                }

                let canonical = canonicalize(resolved.as_str());
                if !seen.insert(canonical.clone()) {
                    continue;
                }

                let text = collapse_whitespace(&el.text().collect::<String>());
                links.push(NavLink {
                    url: canonical,
                    text: if text.is_empty() { None } else { Some(text) },
                });
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn homepage() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn extracts_links_from_nav_regions() {
        let html = r#"
            <html><body>
            <nav>
              <a href="/about">  About
                 Us </a>
              <a href="/pricing">Pricing</a>
            </nav>
            <main><a href="/buried">Not navigation</a></main>
            </body></html>
        "#;

        let links = extract_navigation_links(html, &homepage());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://example.com/about");
        assert_eq!(links[0].text.as_deref(), Some("About Us"));
        assert_eq!(links[1].url, "https://example.com/pricing");
    }

    #[test]
    fn region_priority_keeps_first_occurrence() {
        let html = r#"
            <nav><a href="/about">About (nav)</a></nav>
            <div class="menu"><a href="/about/">About (menu)</a><a href="/contact">Contact</a></div>
            <footer><nav><a href="/contact">Contact (footer)</a><a href="/legal">Legal</a></nav></footer>
        "#;

        let links = extract_navigation_links(html, &homepage());
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/about",
                "https://example.com/contact",
                "https://example.com/legal",
            ]
        );
        assert_eq!(links[0].text.as_deref(), Some("About (nav)"));
    }

    #[test]
    fn external_and_fragment_links_are_dropped() {
        let html = r##"
            <nav>
              <a href="https://other.com/page">External</a>
              <a href="#top">Jump</a>
              <a href="">Empty</a>
              <a href="mailto:hi@example.com">Mail</a>
              <a href="/ok#section">Ok</a>
            </nav>
        "##;

        let links = extract_navigation_links(html, &homepage());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/ok");
    }

    #[test]
    fn titles_are_sanitized_and_capped() {
        assert_eq!(
            extract_title("<title>  Widgets \n &amp; Gadgets </title>"),
            Some("Widgets & Gadgets".to_string())
        );
        let long = format!("<title>{}</title>", "x".repeat(600));
        assert_eq!(extract_title(&long).unwrap().len(), 500);
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn role_navigation_and_class_regions_are_recognized() {
        let html = r#"
            <div role="navigation"><a href="/a">A</a></div>
            <ul class="nav"><li><a href="/b">B</a></li></ul>
        "#;

        let links = extract_navigation_links(html, &homepage());
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
    }
}
