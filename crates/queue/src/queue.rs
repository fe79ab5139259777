use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use a11yscan_core::RepositoryError;

use crate::{backoff_delay, Backoff, BackoffStrategy, EnqueueOpts, Job, JobState, QueueName};

fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

#[derive(FromRow)]
struct JobRow {
    id: i64,
    queue: String,
    payload: serde_json::Value,
    state: String,
    priority: i32,
    attempts_made: i32,
    max_attempts: i32,
    backoff_strategy: String,
    backoff_initial_ms: i64,
    backoff_max_ms: i64,
    remove_on_complete: i32,
    remove_on_fail: i32,
    next_run_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, RepositoryError> {
        let queue = QueueName::parse(&self.queue)
            .ok_or_else(|| RepositoryError::Query(format!("unknown queue: {}", self.queue)))?;
        let state = JobState::parse(&self.state)
            .ok_or_else(|| RepositoryError::Query(format!("unknown job state: {}", self.state)))?;
        let strategy = BackoffStrategy::parse(&self.backoff_strategy)
            .unwrap_or(BackoffStrategy::Exponential);
        Ok(Job {
            id: self.id,
            queue,
            payload: self.payload,
            state,
            priority: self.priority,
            attempts_made: self.attempts_made.max(0) as u32,
            max_attempts: self.max_attempts.max(1) as u32,
            backoff: Backoff {
                strategy,
                initial_ms: self.backoff_initial_ms.max(0) as u64,
                max_ms: self.backoff_max_ms.max(0) as u64,
            },
            remove_on_complete: self.remove_on_complete.max(0) as u32,
            remove_on_fail: self.remove_on_fail.max(0) as u32,
            next_run_at: self.next_run_at,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, queue, payload, state, priority, attempts_made, max_attempts, \
     backoff_strategy, backoff_initial_ms, backoff_max_ms, remove_on_complete, remove_on_fail, \
     next_run_at, last_error, created_at";

/// What happened to a job whose handler threw.
#[derive(Debug)]
pub enum FailOutcome {
    /// Re-enqueued with a backoff delay.
    Retried { next_run_at: DateTime<Utc> },
    /// Attempts exhausted; the job is parked in `failed` and the permanent
    /// failure hook must run exactly once.
    PermanentlyFailed(Job),
}

#[derive(Debug, Clone, Default)]
pub struct QueueCounts {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Durable named queues on Postgres. Claims use `FOR UPDATE SKIP LOCKED`
/// so any number of workers can share one queue without double delivery
/// (modulo crash recovery, which re-delivers — hence at-least-once).
#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(include_str!("../migrations/001_jobs.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Migration(e.to_string()))?;
        info!("job queue migrations complete");
        Ok(())
    }

    pub async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        opts: EnqueueOpts,
    ) -> Result<i64, RepositoryError> {
        let state = if opts.delay_ms > 0 { "delayed" } else { "waiting" };
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO jobs (queue, payload, state, priority, max_attempts, backoff_strategy,
                 backoff_initial_ms, backoff_max_ms, remove_on_complete, remove_on_fail, next_run_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW() + INTERVAL '1 millisecond' * $11)
             RETURNING id",
        )
        .bind(queue.as_str())
        .bind(&payload)
        .bind(state)
        .bind(opts.priority)
        .bind(opts.attempts.max(1) as i32)
        .bind(opts.backoff.strategy.as_str())
        .bind(opts.backoff.initial_ms as i64)
        .bind(opts.backoff.max_ms as i64)
        .bind(opts.remove_on_complete as i32)
        .bind(opts.remove_on_fail as i32)
        .bind(opts.delay_ms as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(queue = queue.as_str(), job_id = row.0, "job enqueued");
        Ok(row.0)
    }

    /// Claim the next runnable job. The attempt counter ticks at claim time
    /// so a worker crash still consumes an attempt after lock recovery.
    pub async fn claim(&self, queue: QueueName) -> Result<Option<Job>, RepositoryError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs
             SET state = 'active', locked_at = NOW(), attempts_made = attempts_made + 1,
                 updated_at = NOW()
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE queue = $1 AND state IN ('waiting', 'delayed') AND next_run_at <= NOW()
                 ORDER BY priority DESC, id
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(JobRow::into_job).transpose()
    }

    pub async fn complete(&self, job: &Job) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE jobs SET state = 'completed', locked_at = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.trim(job.queue, "completed", job.remove_on_complete).await
    }

    /// Record a thrown handler error: either schedule a retry per the job's
    /// backoff or park it as permanently failed.
    pub async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, RepositoryError> {
        if job.attempts_made >= job.max_attempts {
            sqlx::query(
                "UPDATE jobs SET state = 'failed', locked_at = NULL, last_error = $2,
                     updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(job.id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            self.trim(job.queue, "failed", job.remove_on_fail).await?;

            let mut failed = job.clone();
            failed.state = JobState::Failed;
            failed.last_error = Some(error.to_string());
            return Ok(FailOutcome::PermanentlyFailed(failed));
        }

        let delay = backoff_delay(&job.backoff, job.attempts_made);
        let row: (DateTime<Utc>,) = sqlx::query_as(
            "UPDATE jobs
             SET state = 'delayed', locked_at = NULL, last_error = $2,
                 next_run_at = NOW() + INTERVAL '1 millisecond' * $3,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING next_run_at",
        )
        .bind(job.id)
        .bind(error)
        .bind(delay.as_millis() as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(FailOutcome::Retried { next_run_at: row.0 })
    }

    /// Release active jobs whose lock has outlived the worker. The claimed
    /// attempt stays counted.
    pub async fn release_expired(
        &self,
        queue: QueueName,
        lock_timeout_seconds: u64,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs
             SET state = 'waiting', locked_at = NULL, next_run_at = NOW(), updated_at = NOW()
             WHERE queue = $1 AND state = 'active'
               AND locked_at < NOW() - INTERVAL '1 second' * $2",
        )
        .bind(queue.as_str())
        .bind(lock_timeout_seconds as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn trim(&self, queue: QueueName, state: &str, keep: u32) -> Result<(), RepositoryError> {
        sqlx::query(
            "DELETE FROM jobs
             WHERE id IN (
                 SELECT id FROM jobs WHERE queue = $1 AND state = $2
                 ORDER BY id DESC OFFSET $3
             )",
        )
        .bind(queue.as_str())
        .bind(state)
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn counts(&self, queue: QueueName) -> Result<QueueCounts, RepositoryError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM jobs WHERE queue = $1 GROUP BY state",
        )
        .bind(queue.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut counts = QueueCounts::default();
        for (state, count) in rows {
            match state.as_str() {
                "waiting" => counts.waiting = count,
                "delayed" => counts.delayed = count,
                "active" => counts.active = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Dead-letter visibility: permanently failed jobs, newest first.
    pub async fn list_failed(
        &self,
        queue: QueueName,
        limit: i64,
    ) -> Result<Vec<Job>, RepositoryError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE queue = $1 AND state = 'failed'
             ORDER BY id DESC LIMIT $2"
        ))
        .bind(queue.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Admin requeue of dead-lettered jobs with a fresh attempt budget.
    pub async fn retry_failed(&self, queue: QueueName) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs
             SET state = 'waiting', attempts_made = 0, last_error = NULL,
                 next_run_at = NOW(), updated_at = NOW()
             WHERE queue = $1 AND state = 'failed'",
        )
        .bind(queue.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
