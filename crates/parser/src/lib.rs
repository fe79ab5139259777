pub mod navigation;
pub mod robots;
pub mod sitemap;
pub mod url_rules;

pub use navigation::{extract_navigation_links, extract_title, NavLink};
pub use robots::RobotsRules;
pub use sitemap::{parse_sitemap, SitemapDocument, SitemapEntry};
pub use url_rules::{canonicalize, deduplicate, is_private_address, is_same_domain, validate};
