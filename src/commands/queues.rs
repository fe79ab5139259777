use anyhow::{anyhow, Result};

use a11yscan_core::config::AppConfig;
use a11yscan_queue::QueueName;

use super::bootstrap;
use crate::cli::QueueCommand;

pub async fn run(config: AppConfig, command: QueueCommand) -> Result<()> {
    let (_storage, queue, _cache) = bootstrap(&config).await?;

    match command {
        QueueCommand::List => {
            println!(
                "{:<16} {:>8} {:>8} {:>8} {:>10} {:>8}",
                "queue", "waiting", "delayed", "active", "completed", "failed"
            );
            for name in QueueName::ALL {
                let counts = queue.counts(name).await?;
                println!(
                    "{:<16} {:>8} {:>8} {:>8} {:>10} {:>8}",
                    name.as_str(),
                    counts.waiting,
                    counts.delayed,
                    counts.active,
                    counts.completed,
                    counts.failed
                );
            }
        }
        QueueCommand::Failed { queue: name, limit } => {
            let name =
                QueueName::parse(&name).ok_or_else(|| anyhow!("unknown queue: {name}"))?;
            let failed = queue.list_failed(name, limit).await?;
            if failed.is_empty() {
                println!("no permanently failed jobs in {}", name.as_str());
            }
            for job in failed {
                println!(
                    "job {} attempts={}/{} error={}\n  payload: {}",
                    job.id,
                    job.attempts_made,
                    job.max_attempts,
                    job.last_error.as_deref().unwrap_or("?"),
                    job.payload,
                );
            }
        }
        QueueCommand::Retry { queue: name } => {
            let name =
                QueueName::parse(&name).ok_or_else(|| anyhow!("unknown queue: {name}"))?;
            let retried = queue.retry_failed(name).await?;
            println!("{retried} jobs requeued on {}", name.as_str());
        }
    }
    Ok(())
}
