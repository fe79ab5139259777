/// Parsed robots.txt policy for one user-agent.
///
/// Grouped directives: rules under a `User-agent:` line that names the
/// caller override the wildcard (`*`) group entirely; the wildcard group
/// applies only when no specific group matches. `Sitemap:` lines are global.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    pub disallowed_paths: Vec<String>,
    pub crawl_delay_seconds: Option<u64>,
    pub sitemap_urls: Vec<String>,
}

#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    disallows: Vec<String>,
    crawl_delay: Option<u64>,
    has_rules: bool,
}

impl RobotsRules {
    pub fn parse(text: &str, user_agent: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut sitemap_urls: Vec<String> = Vec::new();

        for raw_line in text.lines() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let line = line.trim();

            if line.is_empty() {
                // Blank line closes the current group.
                if !current.agents.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();

            match name.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if current.has_rules {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "disallow" => {
                    current.disallows.push(value.to_string());
                    current.has_rules = true;
                }
                "allow" => {
                    // Allow narrows a disallow; tracked only as group content.
                    current.has_rules = true;
                }
                "crawl-delay" => {
                    if let Ok(secs) = value.parse::<f64>() {
                        if secs.is_finite() && secs >= 0.0 {
                            current.crawl_delay = Some(secs.ceil() as u64);
                        }
                    }
                    current.has_rules = true;
                }
                "sitemap" => {
                    if url::Url::parse(value).is_ok() {
                        sitemap_urls.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        let agent_lower = user_agent.to_ascii_lowercase();
        let matches_agent = |g: &&Group| {
            g.agents
                .iter()
                .any(|a| a != "*" && !a.is_empty() && agent_lower.contains(a.as_str()))
        };
        let is_wildcard = |g: &&Group| g.agents.iter().any(|a| a == "*");

        let specific: Vec<&Group> = groups.iter().filter(matches_agent).collect();
        let selected: Vec<&Group> = if specific.is_empty() {
            groups.iter().filter(is_wildcard).collect()
        } else {
            specific
        };

        let mut disallowed_paths: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut crawl_delay_seconds = None;
        for group in &selected {
            for path in &group.disallows {
                if seen.insert(path.clone()) {
                    disallowed_paths.push(path.clone());
                }
            }
            if crawl_delay_seconds.is_none() {
                crawl_delay_seconds = group.crawl_delay;
            }
        }

        RobotsRules {
            disallowed_paths,
            crawl_delay_seconds,
            sitemap_urls,
        }
    }

    /// Prefix match against the disallow list, `*` matching any sequence.
    /// Empty and bare-`/` entries are ignored; no rule means allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        for rule in &self.disallowed_paths {
            let rule = rule.trim();
            if rule.is_empty() || rule == "/" {
                continue;
            }
            if wildcard_prefix_match(rule, &path) {
                return false;
            }
        }
        true
    }

    /// Write the policy back out as a wildcard group. Round-trips the
    /// disallow list through `parse`.
    pub fn serialize(&self) -> String {
        let mut out = String::from("User-agent: *\n");
        for path in &self.disallowed_paths {
            out.push_str("Disallow: ");
            out.push_str(path);
            out.push('\n');
        }
        if let Some(delay) = self.crawl_delay_seconds {
            out.push_str(&format!("Crawl-delay: {delay}\n"));
        }
        for sitemap in &self.sitemap_urls {
            out.push_str("Sitemap: ");
            out.push_str(sitemap);
            out.push('\n');
        }
        out
    }
}

/// `pattern` must match at the start of `path`; each `*` spans any
/// (possibly empty) run of characters.
fn wildcard_prefix_match(pattern: &str, path: &str) -> bool {
    let mut segments = pattern.split('*');
    let Some(first) = segments.next() else {
        return true;
    };
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        match path[pos..].find(segment) {
            Some(offset) => pos += offset + segment.len(),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wildcard_group_with_delay_and_sitemap() {
        let text = "User-agent: *\nDisallow: /admin/\nCrawl-delay: 1\nSitemap: https://example.com/sitemap.xml";
        let rules = RobotsRules::parse(text, "a11yscan");

        assert_eq!(rules.disallowed_paths, vec!["/admin/".to_string()]);
        assert_eq!(rules.crawl_delay_seconds, Some(1));
        assert_eq!(
            rules.sitemap_urls,
            vec!["https://example.com/sitemap.xml".to_string()]
        );

        assert!(rules.is_allowed("/about"));
        assert!(!rules.is_allowed("/admin/users"));
    }

    #[test]
    fn specific_agent_group_overrides_wildcard() {
        let text = "\
User-agent: *
Disallow: /private/

User-agent: a11yscan
Disallow: /scanner-only/
Crawl-delay: 5
";
        let rules = RobotsRules::parse(text, "a11yscan/0.1");
        assert_eq!(rules.disallowed_paths, vec!["/scanner-only/".to_string()]);
        assert_eq!(rules.crawl_delay_seconds, Some(5));
        assert!(rules.is_allowed("/private/page"));
        assert!(!rules.is_allowed("/scanner-only/page"));

        let other = RobotsRules::parse(text, "somebot");
        assert_eq!(other.disallowed_paths, vec!["/private/".to_string()]);
        assert_eq!(other.crawl_delay_seconds, None);
    }

    #[test]
    fn comments_and_duplicates_are_stripped() {
        let text = "\
# main group
User-agent: * # applies to everyone
Disallow: /a/  # no trailing
Disallow: /a/
Disallow: /b/
";
        let rules = RobotsRules::parse(text, "bot");
        assert_eq!(
            rules.disallowed_paths,
            vec!["/a/".to_string(), "/b/".to_string()]
        );
    }

    #[test]
    fn invalid_sitemap_urls_are_dropped() {
        let text = "User-agent: *\nDisallow:\nSitemap: not-a-url\nSitemap: https://example.com/s.xml";
        let rules = RobotsRules::parse(text, "bot");
        assert_eq!(rules.sitemap_urls, vec!["https://example.com/s.xml".to_string()]);
    }

    #[test]
    fn empty_and_root_disallows_are_ignored() {
        let text = "User-agent: *\nDisallow:\nDisallow: /\n";
        let rules = RobotsRules::parse(text, "bot");
        assert!(rules.is_allowed("/anything"));
        assert!(rules.is_allowed("anything"));
    }

    #[test]
    fn wildcard_in_rule_matches_any_sequence() {
        let text = "User-agent: *\nDisallow: /search*results\nDisallow: /*.pdf\n";
        let rules = RobotsRules::parse(text, "bot");
        assert!(!rules.is_allowed("/search/all/results"));
        assert!(!rules.is_allowed("/searchresults"));
        assert!(rules.is_allowed("/search/all"));
        assert!(!rules.is_allowed("/files/report.pdf"));
    }

    #[test]
    fn serialize_round_trips_disallow_paths() {
        let text = "\
User-agent: *
Disallow: /admin/
Disallow: /tmp/*
Crawl-delay: 2
Sitemap: https://example.com/sitemap.xml
";
        let parsed = RobotsRules::parse(text, "bot");
        let reparsed = RobotsRules::parse(&parsed.serialize(), "bot");
        assert_eq!(reparsed.disallowed_paths, parsed.disallowed_paths);
        assert_eq!(reparsed.crawl_delay_seconds, parsed.crawl_delay_seconds);
        assert_eq!(reparsed.sitemap_urls, parsed.sitemap_urls);
    }
}
