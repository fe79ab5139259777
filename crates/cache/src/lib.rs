use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use a11yscan_core::{AiVerification, DiscoveredPage, Discovery, WcagLevel};

/// Snapshot published when a discovery completes. Readers get the whole
/// page set without touching the database for 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub discovery: Discovery,
    pub pages: Vec<DiscoveredPage>,
    pub cached_at: DateTime<Utc>,
}

/// Short-TTL cache for discovery results. Values are stored serialized so
/// the integrity check exercises the same path an external blob cache
/// would; a corrupt or mismatched entry is evicted and reads as a miss.
#[derive(Clone)]
pub struct ResultCache {
    inner: Cache<String, Arc<str>>,
}

fn discovery_key(id: i64) -> String {
    format!("discovery:{id}:result")
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache writes are best-effort; a serialization failure is logged and
    /// swallowed so publication never fails the discovery.
    pub async fn put_discovery(&self, snapshot: &DiscoverySnapshot) {
        let key = discovery_key(snapshot.discovery.id);
        match serde_json::to_string(snapshot) {
            Ok(json) => {
                self.inner.insert(key, Arc::from(json.as_str())).await;
            }
            Err(e) => warn!(discovery_id = snapshot.discovery.id, "snapshot serialize failed: {e}"),
        }
    }

    pub async fn get_discovery(&self, id: i64) -> Option<DiscoverySnapshot> {
        let key = discovery_key(id);
        let raw = self.inner.get(&key).await?;

        let snapshot: DiscoverySnapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                warn!(discovery_id = id, "corrupt cache entry dropped: {e}");
                self.inner.invalidate(&key).await;
                return None;
            }
        };

        if snapshot.discovery.id != id {
            warn!(
                discovery_id = id,
                found = snapshot.discovery.id,
                "cache integrity mismatch, dropping entry"
            );
            self.inner.invalidate(&key).await;
            return None;
        }

        debug!(discovery_id = id, pages = snapshot.pages.len(), "discovery cache hit");
        Some(snapshot)
    }

    pub async fn invalidate_discovery(&self, id: i64) {
        self.inner.invalidate(&discovery_key(id)).await;
    }
}

/// Result of one analyzed mini-batch, addressed purely by content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub verifications: Vec<AiVerification>,
    pub tokens_used: i64,
    pub model: String,
    pub stored_at: DateTime<Utc>,
}

/// Content-addressed cache for AI mini-batch results. Keys are derived from
/// the page bytes, so concurrent writers racing on the same key simply
/// agree; last writer wins and nothing is lost.
#[derive(Clone)]
pub struct AnalysisCache {
    inner: Cache<String, Arc<CachedAnalysis>>,
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn analysis_key(content_hash: &str, level: WcagLevel, batch_index: usize) -> String {
    format!("{content_hash}:{}:{batch_index}", level.as_str())
}

impl AnalysisCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(
        &self,
        content_hash: &str,
        level: WcagLevel,
        batch_index: usize,
    ) -> Option<Arc<CachedAnalysis>> {
        self.inner
            .get(&analysis_key(content_hash, level, batch_index))
            .await
    }

    pub async fn put(
        &self,
        content_hash: &str,
        level: WcagLevel,
        batch_index: usize,
        analysis: CachedAnalysis,
    ) {
        self.inner
            .insert(
                analysis_key(content_hash, level, batch_index),
                Arc::new(analysis),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11yscan_core::{DiscoveryMode, DiscoveryPhase, DiscoveryStatus, VerificationStatus};

    fn snapshot(id: i64) -> DiscoverySnapshot {
        DiscoverySnapshot {
            discovery: Discovery {
                id,
                session_id: "sess".into(),
                homepage_url: "https://example.com/".into(),
                mode: DiscoveryMode::Auto,
                status: DiscoveryStatus::Completed,
                phase: DiscoveryPhase::None,
                max_pages: 100,
                max_depth: 3,
                partial_results: false,
                error_code: None,
                error_message: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                started_at: None,
                completed_at: None,
            },
            pages: vec![],
            cached_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_snapshot() {
        let cache = ResultCache::new(Duration::from_secs(60), 100);
        cache.put_discovery(&snapshot(7)).await;

        let hit = cache.get_discovery(7).await.expect("cache hit");
        assert_eq!(hit.discovery.id, 7);
        assert!(cache.get_discovery(8).await.is_none());
    }

    #[tokio::test]
    async fn integrity_mismatch_reads_as_miss_and_evicts() {
        let cache = ResultCache::new(Duration::from_secs(60), 100);

        // Write a snapshot under the wrong id's key.
        let key = super::discovery_key(42);
        let json = serde_json::to_string(&snapshot(7)).unwrap();
        cache.inner.insert(key.clone(), Arc::from(json.as_str())).await;

        assert!(cache.get_discovery(42).await.is_none());
        assert!(cache.inner.get(&key).await.is_none(), "entry should be evicted");
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_miss() {
        let cache = ResultCache::new(Duration::from_secs(60), 100);
        cache
            .inner
            .insert(super::discovery_key(1), Arc::from("{not json"))
            .await;
        assert!(cache.get_discovery(1).await.is_none());
    }

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let a = content_hash(b"<html>one</html>");
        let b = content_hash(b"<html>one</html>");
        let c = content_hash(b"<html>two</html>");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn analysis_cache_is_keyed_by_hash_level_and_index() {
        let cache = AnalysisCache::new(Duration::from_secs(60), 100);
        let analysis = CachedAnalysis {
            verifications: vec![AiVerification {
                criterion_id: "1.1.1".into(),
                status: VerificationStatus::Pass,
                explanation: "alt text present".into(),
                fix_suggestion: None,
                priority: None,
            }],
            tokens_used: 321,
            model: "test-model".into(),
            stored_at: Utc::now(),
        };
        cache.put("abc", WcagLevel::Aa, 0, analysis).await;

        assert!(cache.get("abc", WcagLevel::Aa, 0).await.is_some());
        assert!(cache.get("abc", WcagLevel::Aa, 1).await.is_none());
        assert!(cache.get("abc", WcagLevel::Aaa, 0).await.is_none());
        assert!(cache.get("xyz", WcagLevel::Aa, 0).await.is_none());
    }
}
