pub mod analyze;
pub mod discover;
pub mod queues;
pub mod scan;
pub mod status;
pub mod work;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use a11yscan_cache::ResultCache;
use a11yscan_core::config::AppConfig;
use a11yscan_queue::JobQueue;
use a11yscan_storage::Storage;

/// Shared bring-up: connected storage with migrations applied, the job
/// queue on the same pool, and the discovery result cache.
pub async fn bootstrap(config: &AppConfig) -> Result<(Arc<Storage>, JobQueue, ResultCache)> {
    let storage = Storage::new(&config.database.postgres_url).await?;
    storage.run_migrations().await?;

    let queue = JobQueue::new(storage.pool().clone());
    queue.run_migrations().await?;

    let cache = ResultCache::new(
        Duration::from_secs(config.discovery.result_cache_ttl_hours * 3600),
        10_000,
    );

    Ok((Arc::new(storage), queue, cache))
}
