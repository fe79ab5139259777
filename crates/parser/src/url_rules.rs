use std::net::{IpAddr, Ipv6Addr};

use url::Url;

use a11yscan_core::ServiceError;

/// Normalize a URL for dedup and same-domain checks: lowercase host, strip a
/// leading `www.`, drop the fragment, strip the trailing slash unless the
/// path is just `/`. Query strings are preserved. Unparseable input comes
/// back unchanged.
pub fn canonicalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lowered = host.to_ascii_lowercase();
        let stripped = lowered.strip_prefix("www.").unwrap_or(&lowered).to_string();
        if stripped != host {
            // set_host only fails on cannot-be-a-base URLs, which have no host
            let _ = url.set_host(Some(&stripped));
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    url.to_string()
}

fn canonical_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Two URLs share a domain when their hosts match after lowercasing and
/// `www.` stripping. Parse failure on either side is a mismatch.
pub fn is_same_domain(a: &str, b: &str) -> bool {
    match (canonical_host(a), canonical_host(b)) {
        (Some(ha), Some(hb)) => ha == hb,
        _ => false,
    }
}

/// True when the host is a literal address in a private, loopback, or
/// link-local range. Names that don't parse as IPs are not private — DNS
/// rebinding is out of scope here.
pub fn is_private_address(host: &str) -> bool {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6 == Ipv6Addr::LOCALHOST || is_ipv6_link_local(&v6),
        Err(_) => false,
    }
}

// fe80::/10
fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

/// Full admission check for a URL discovered under `homepage`. Returns the
/// parsed URL so callers fetch exactly what was validated.
pub fn validate(raw: &str, homepage: &str) -> Result<Url, ServiceError> {
    let url = Url::parse(raw).map_err(|_| ServiceError::InvalidUrl(raw.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ServiceError::UnsupportedScheme(other.to_string())),
    }

    let host = url
        .host_str()
        .ok_or_else(|| ServiceError::InvalidUrl(raw.to_string()))?;
    if is_private_address(host) {
        return Err(ServiceError::PrivateAddress(host.to_string()));
    }

    if !is_same_domain(raw, homepage) {
        return Err(ServiceError::DomainMismatch {
            url: raw.to_string(),
            homepage: homepage.to_string(),
        });
    }

    Ok(url)
}

/// Canonicalize and keep the first occurrence of each URL, preserving the
/// input order.
pub fn deduplicate(urls: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in urls {
        let canonical = canonicalize(raw);
        if seen.insert(canonical.clone()) {
            out.push(canonical);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent() {
        let cases = [
            "https://EXAMPLE.com/Page/",
            "https://www.example.com/page#frag",
            "https://example.com/search?q=a&b=2",
            "https://example.com/",
            "https://example.com",
            "not a url at all",
        ];
        for raw in cases {
            let once = canonicalize(raw);
            assert_eq!(canonicalize(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn canonicalize_normalizes_host_and_path() {
        assert_eq!(
            canonicalize("https://WWW.Example.COM/Page/"),
            "https://example.com/Page"
        );
        assert_eq!(
            canonicalize("https://example.com/page#section"),
            "https://example.com/page"
        );
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
        assert_eq!(
            canonicalize("https://example.com/a?q=1#x"),
            "https://example.com/a?q=1"
        );
    }

    #[test]
    fn same_domain_ignores_case_and_www() {
        assert!(is_same_domain(
            "https://www.example.com/a",
            "https://EXAMPLE.com/b"
        ));
        assert!(!is_same_domain("https://example.com", "https://example.org"));
        assert!(!is_same_domain("https://example.com", "not a url"));
        assert!(is_same_domain("https://example.com/x", "https://example.com/x"));
    }

    #[test]
    fn private_ranges_are_rejected() {
        let private = [
            "10.0.0.1",
            "10.255.255.255",
            "172.16.0.1",
            "172.31.4.4",
            "192.168.1.1",
            "127.0.0.1",
            "127.8.8.8",
            "169.254.0.1",
            "::1",
            "[::1]",
            "fe80::1",
            "FE80::dead:beef",
        ];
        for host in private {
            assert!(is_private_address(host), "{host} should be private");
        }

        let public = ["8.8.8.8", "1.1.1.1", "172.32.0.1", "example.com", "999.1.1.1", ""];
        for host in public {
            assert!(!is_private_address(host), "{host} should not be private");
        }
    }

    #[test]
    fn validate_maps_each_failure_to_its_code() {
        let homepage = "https://example.com";
        assert_eq!(
            validate("::::", homepage).unwrap_err().code(),
            "INVALID_URL"
        );
        assert_eq!(
            validate("ftp://example.com/file", homepage).unwrap_err().code(),
            "UNSUPPORTED_SCHEME"
        );
        assert_eq!(
            validate("https://192.168.0.1/admin", homepage)
                .unwrap_err()
                .code(),
            "PRIVATE_ADDRESS"
        );
        assert_eq!(
            validate("https://evil.com/page", homepage).unwrap_err().code(),
            "DOMAIN_MISMATCH"
        );
        assert!(validate("https://www.example.com/about", homepage).is_ok());
    }

    #[test]
    fn deduplicate_collapses_canonical_duplicates_in_order() {
        let urls: Vec<String> = [
            "https://example.com/page",
            "https://example.com/page/",
            "https://EXAMPLE.COM/page",
            "https://www.example.com/page",
            "https://example.com/page#x",
            "https://example.com/about",
            "https://example.com/about/",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let deduped = deduplicate(&urls);
        assert_eq!(
            deduped,
            vec![
                "https://example.com/page".to_string(),
                "https://example.com/about".to_string(),
            ]
        );
    }
}
