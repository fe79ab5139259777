use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use a11yscan_core::collaborators::{ObjectStore, StoredObject};

/// Filesystem-backed artifact store serving expiring links under the
/// app's public URL. Swappable for a cloud store behind the same trait.
pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        ttl: Duration,
    ) -> Result<StoredObject> {
        // Keys are internal, but never let one escape the artifact root.
        let safe_key: String = key
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .collect::<Vec<_>>()
            .join("/");
        let path = self.root.join(&safe_key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("artifact dir")?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("write {}", path.display()))?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        let url = format!(
            "{}/artifacts/{}?expires={}",
            self.base_url,
            safe_key,
            expires_at.timestamp()
        );
        debug!(key = %safe_key, bytes = bytes.len(), "artifact stored");
        Ok(StoredObject { url, expires_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_bytes_and_builds_expiring_url() {
        let dir = std::env::temp_dir().join(format!("a11yscan-store-{}", std::process::id()));
        let store = FsObjectStore::new(&dir, "https://app.test/");

        let stored = store
            .put(
                "reports/scan-1/report-9.json",
                b"{}".to_vec(),
                "application/json",
                Duration::from_secs(3600),
            )
            .await
            .unwrap();

        assert!(stored.url.starts_with("https://app.test/artifacts/reports/scan-1/"));
        assert!(stored.url.contains("expires="));
        let on_disk = tokio::fs::read(dir.join("reports/scan-1/report-9.json"))
            .await
            .unwrap();
        assert_eq!(on_disk, b"{}");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn path_traversal_segments_are_dropped() {
        let dir = std::env::temp_dir().join(format!("a11yscan-store-t-{}", std::process::id()));
        let store = FsObjectStore::new(&dir, "https://app.test");
        let stored = store
            .put("../../etc/passwd", b"x".to_vec(), "text/plain", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(stored.url.contains("/artifacts/etc/passwd"));
        assert!(dir.join("etc/passwd").exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
