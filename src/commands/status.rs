use anyhow::{anyhow, Result};

use a11yscan_core::config::AppConfig;
use a11yscan_queue::QueueName;

use super::bootstrap;

pub async fn run(config: AppConfig) -> Result<()> {
    let (storage, queue, _cache) = bootstrap(&config).await?;
    storage.check_connectivity().await?;
    println!("database: ok");

    println!("queues:");
    for name in QueueName::ALL {
        let counts = queue.counts(name).await?;
        println!(
            "  {:<16} waiting={} delayed={} active={} failed={}",
            name.as_str(),
            counts.waiting,
            counts.delayed,
            counts.active,
            counts.failed
        );
    }
    Ok(())
}

/// Data deletion request: removes the row and everything hanging off it
/// (pages, issues, results, checkpoints cascade in the schema).
pub async fn delete(config: AppConfig, entity: String, id: i64) -> Result<()> {
    let (storage, _queue, cache) = bootstrap(&config).await?;

    let deleted = match entity.as_str() {
        "scan" => storage.delete_scan(id).await?,
        "batch" => storage.delete_batch(id).await?,
        "discovery" => {
            let deleted = storage.delete_discovery(id).await?;
            cache.invalidate_discovery(id).await;
            deleted
        }
        other => return Err(anyhow!("unknown entity: {other} (expected scan, batch, or discovery)")),
    };

    if deleted {
        println!("{entity} {id} deleted");
    } else {
        println!("{entity} {id} not found");
    }
    Ok(())
}
