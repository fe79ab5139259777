mod engine;
mod politeness;
mod service;
mod sitemap_resolver;

pub use engine::DiscoveryEngine;
pub use politeness::Politeness;
pub use service::{DiscoveryService, DiscoverySubject};
pub use sitemap_resolver::{ResolvedSitemaps, SitemapResolver};
