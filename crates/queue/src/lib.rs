mod queue;
mod worker;

pub use queue::{FailOutcome, JobQueue, QueueCounts};
pub use worker::{Processor, Worker};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five durable queues. There is no cross-queue ordering; within one
/// queue jobs run FIFO inside a priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueName {
    ScanPage,
    GenerateReport,
    SendEmail,
    BatchReport,
    AiBatch,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::ScanPage => "scan-page",
            QueueName::GenerateReport => "generate-report",
            QueueName::SendEmail => "send-email",
            QueueName::BatchReport => "batch-report",
            QueueName::AiBatch => "ai-batch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scan-page" => Some(QueueName::ScanPage),
            "generate-report" => Some(QueueName::GenerateReport),
            "send-email" => Some(QueueName::SendEmail),
            "batch-report" => Some(QueueName::BatchReport),
            "ai-batch" => Some(QueueName::AiBatch),
            _ => None,
        }
    }

    pub const ALL: [QueueName; 5] = [
        QueueName::ScanPage,
        QueueName::GenerateReport,
        QueueName::SendEmail,
        QueueName::BatchReport,
        QueueName::AiBatch,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "delayed" => Some(JobState::Delayed),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Exponential,
    Fixed,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffStrategy::Exponential => "exponential",
            BackoffStrategy::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exponential" => Some(BackoffStrategy::Exponential),
            "fixed" => Some(BackoffStrategy::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub strategy: BackoffStrategy,
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            initial_ms: 1_000,
            max_ms: 60_000,
        }
    }
}

/// Delay before the next attempt, given how many attempts have already
/// been made (1-based: the first retry sees `attempts_made == 1`).
pub fn backoff_delay(backoff: &Backoff, attempts_made: u32) -> Duration {
    let ms = match backoff.strategy {
        BackoffStrategy::Fixed => backoff.initial_ms,
        BackoffStrategy::Exponential => {
            let shift = attempts_made.saturating_sub(1).min(32);
            backoff.initial_ms.saturating_mul(1u64 << shift)
        }
    };
    Duration::from_millis(ms.min(backoff.max_ms))
}

/// Knobs accepted at enqueue time. Defaults follow the queue contract:
/// five attempts, exponential backoff, immediate start.
#[derive(Debug, Clone)]
pub struct EnqueueOpts {
    pub attempts: u32,
    pub backoff: Backoff,
    pub delay_ms: u64,
    pub priority: i32,
    pub remove_on_complete: u32,
    pub remove_on_fail: u32,
}

impl Default for EnqueueOpts {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Backoff::default(),
            delay_ms: 0,
            priority: 0,
            remove_on_complete: 100,
            remove_on_fail: 1_000,
        }
    }
}

/// One durable job as handed to a processor. Delivery is at-least-once;
/// processors must be idempotent on `(id, payload)`.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub queue: QueueName,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub priority: i32,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub remove_on_complete: u32,
    pub remove_on_fail: u32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff {
            strategy: BackoffStrategy::Exponential,
            initial_ms: 1_000,
            max_ms: 10_000,
        };
        assert_eq!(backoff_delay(&backoff, 1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&backoff, 2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&backoff, 3), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(&backoff, 4), Duration::from_millis(8_000));
        assert_eq!(backoff_delay(&backoff, 5), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(&backoff, 60), Duration::from_millis(10_000));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff {
            strategy: BackoffStrategy::Fixed,
            initial_ms: 2_500,
            max_ms: 60_000,
        };
        for attempt in 1..6 {
            assert_eq!(backoff_delay(&backoff, attempt), Duration::from_millis(2_500));
        }
    }

    #[test]
    fn queue_names_round_trip() {
        for name in QueueName::ALL {
            assert_eq!(QueueName::parse(name.as_str()), Some(name));
        }
        assert_eq!(QueueName::parse("nope"), None);
    }
}
