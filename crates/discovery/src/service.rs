use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use a11yscan_cache::{DiscoverySnapshot, ResultCache};
use a11yscan_core::config::DiscoveryConfig;
use a11yscan_core::{
    month_key, DiscoveredPage, Discovery, DiscoveryMode, PageSource, ServiceError,
};
use a11yscan_parser::url_rules::{canonicalize, validate};
use a11yscan_storage::{NewDiscovery, Storage};

/// Who a discovery is charged to. Guests are tracked by session, signed-in
/// users by account; both share the same monthly quota.
#[derive(Debug, Clone)]
pub enum DiscoverySubject {
    Session(String),
    User(String),
}

impl DiscoverySubject {
    pub fn key(&self) -> String {
        match self {
            DiscoverySubject::Session(id) => format!("session:{id}"),
            DiscoverySubject::User(id) => format!("user:{id}"),
        }
    }
}

/// API-facing discovery operations: admission, reads (through the result
/// cache), manual page management, cancellation, deletion. The engine owns
/// all other writes.
pub struct DiscoveryService {
    storage: Arc<Storage>,
    cache: ResultCache,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(storage: Arc<Storage>, cache: ResultCache, config: DiscoveryConfig) -> Self {
        Self {
            storage,
            cache,
            config,
        }
    }

    /// Admission order matters: the quota is checked before the URL is even
    /// validated, and the counter increments only after the row exists.
    pub async fn create(
        &self,
        subject: &DiscoverySubject,
        homepage_url: &str,
        mode: DiscoveryMode,
        max_pages: Option<u32>,
        max_depth: Option<u32>,
    ) -> Result<Discovery, ServiceError> {
        let subject_key = subject.key();
        let month = month_key(Utc::now());

        let used = self.storage.get_usage(&subject_key, &month).await?;
        if used >= self.config.monthly_limit as i64 {
            return Err(ServiceError::UsageLimitExceeded {
                limit: self.config.monthly_limit,
            });
        }

        let canonical = canonicalize(homepage_url);
        validate(&canonical, &canonical)?;

        let discovery = self
            .storage
            .create_discovery(NewDiscovery {
                session_id: &subject_key,
                homepage_url: &canonical,
                mode,
                max_pages: max_pages.unwrap_or(self.config.default_max_pages),
                max_depth: max_depth.unwrap_or(self.config.default_max_depth),
            })
            .await?;

        let count = self.storage.increment_usage(&subject_key, &month).await?;
        info!(
            discovery_id = discovery.id,
            subject = %subject_key,
            usage = count,
            "discovery created"
        );
        Ok(discovery)
    }

    pub async fn get(&self, id: i64) -> Result<Discovery, ServiceError> {
        self.storage
            .get_discovery(id)
            .await?
            .ok_or(ServiceError::DiscoveryNotFound(id))
    }

    /// Full snapshot: served from the result cache when a completed run was
    /// published there, otherwise assembled from the store.
    pub async fn get_result(&self, id: i64) -> Result<DiscoverySnapshot, ServiceError> {
        if let Some(snapshot) = self.cache.get_discovery(id).await {
            return Ok(snapshot);
        }

        let discovery = self.get(id).await?;
        let pages = self.storage.list_pages(id).await?;
        debug!(discovery_id = id, pages = pages.len(), "snapshot assembled from store");
        Ok(DiscoverySnapshot {
            discovery,
            pages,
            cached_at: Utc::now(),
        })
    }

    /// Flag the row for cooperative cancellation. Returns false when the
    /// discovery was already terminal.
    pub async fn cancel(&self, id: i64) -> Result<bool, ServiceError> {
        self.get(id).await?;
        Ok(self.storage.request_discovery_cancel(id).await?)
    }

    pub async fn add_manual_page(
        &self,
        discovery_id: i64,
        url: &str,
    ) -> Result<DiscoveredPage, ServiceError> {
        let discovery = self.get(discovery_id).await?;

        validate(url, &discovery.homepage_url)?;
        let canonical = canonicalize(url);

        let count = self.storage.count_pages(discovery_id).await?;
        if count >= discovery.max_pages as i64 {
            return Err(ServiceError::PageLimitReached {
                max_pages: discovery.max_pages,
            });
        }

        let inserted = self
            .storage
            .insert_page(
                discovery_id,
                &canonical,
                None,
                PageSource::Manual,
                0,
                None,
                None,
            )
            .await?;

        match inserted {
            Some(_) => {
                self.cache.invalidate_discovery(discovery_id).await;
                let pages = self.storage.list_pages(discovery_id).await?;
                pages
                    .into_iter()
                    .find(|p| p.url == canonical)
                    .ok_or_else(|| {
                        ServiceError::Repository(a11yscan_core::RepositoryError::Query(
                            "inserted page vanished".into(),
                        ))
                    })
            }
            None => Err(ServiceError::PageAlreadyExists {
                discovery_id,
                url: canonical,
            }),
        }
    }

    pub async fn add_manual_pages(
        &self,
        discovery_id: i64,
        urls: &[String],
    ) -> Vec<(String, Result<DiscoveredPage, ServiceError>)> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let result = self.add_manual_page(discovery_id, url).await;
            results.push((url.clone(), result));
        }
        results
    }

    pub async fn remove_manual_page(
        &self,
        discovery_id: i64,
        url: &str,
    ) -> Result<bool, ServiceError> {
        self.get(discovery_id).await?;
        let canonical = canonicalize(url);
        let removed = self
            .storage
            .remove_manual_page(discovery_id, &canonical)
            .await?;
        if removed {
            self.cache.invalidate_discovery(discovery_id).await;
        }
        Ok(removed)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        let deleted = self.storage.delete_discovery(id).await?;
        if deleted {
            self.cache.invalidate_discovery(id).await;
        }
        Ok(deleted)
    }
}
