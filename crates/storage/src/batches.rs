use chrono::{DateTime, Utc};
use sqlx::FromRow;

use a11yscan_core::{BatchScan, BatchStatus, RepositoryError, WcagLevel};

use crate::{bad_enum, db_err, Storage};

#[derive(FromRow)]
struct BatchRow {
    id: i64,
    session_id: Option<String>,
    homepage_url: String,
    wcag_level: String,
    status: String,
    total_urls: i32,
    completed_count: i32,
    failed_count: i32,
    email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl BatchRow {
    fn into_batch(self) -> Result<BatchScan, RepositoryError> {
        Ok(BatchScan {
            id: self.id,
            session_id: self.session_id,
            homepage_url: self.homepage_url,
            wcag_level: WcagLevel::parse(&self.wcag_level)
                .ok_or_else(|| bad_enum("wcag_level", &self.wcag_level))?,
            status: BatchStatus::parse(&self.status)
                .ok_or_else(|| bad_enum("status", &self.status))?,
            total_urls: self.total_urls,
            completed_count: self.completed_count,
            failed_count: self.failed_count,
            email: self.email,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

const BATCH_COLUMNS: &str = "id, session_id, homepage_url, wcag_level, status, total_urls, \
     completed_count, failed_count, email, created_at, updated_at, completed_at";

impl Storage {
    pub async fn create_batch(
        &self,
        session_id: Option<&str>,
        homepage_url: &str,
        wcag_level: WcagLevel,
        total_urls: i32,
        email: Option<&str>,
    ) -> Result<BatchScan, RepositoryError> {
        let row: BatchRow = sqlx::query_as(&format!(
            "INSERT INTO batch_scans (session_id, homepage_url, wcag_level, total_urls, email)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(session_id)
        .bind(homepage_url)
        .bind(wcag_level.as_str())
        .bind(total_urls)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_batch()
    }

    pub async fn get_batch(&self, id: i64) -> Result<Option<BatchScan>, RepositoryError> {
        let row: Option<BatchRow> =
            sqlx::query_as(&format!("SELECT {BATCH_COLUMNS} FROM batch_scans WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(BatchRow::into_batch).transpose()
    }

    pub async fn list_batches(
        &self,
        session_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<BatchScan>, RepositoryError> {
        let rows: Vec<BatchRow> = match session_id {
            Some(session) => {
                sqlx::query_as(&format!(
                    "SELECT {BATCH_COLUMNS} FROM batch_scans WHERE session_id = $1
                     ORDER BY id DESC LIMIT $2"
                ))
                .bind(session)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {BATCH_COLUMNS} FROM batch_scans ORDER BY id DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?
            }
        };

        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    pub async fn mark_batch_running(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE batch_scans SET status = 'RUNNING', updated_at = NOW()
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    /// Record one child scan reaching a terminal state. The increment is a
    /// single UPDATE so concurrent children can't lose counts; the updated
    /// row comes back so the caller can decide whether the batch is done.
    pub async fn record_child_result(
        &self,
        batch_id: i64,
        success: bool,
    ) -> Result<Option<BatchScan>, RepositoryError> {
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "UPDATE batch_scans
             SET completed_count = completed_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                 failed_count = failed_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                 updated_at = NOW()
             WHERE id = $1 AND completed_count + failed_count < total_urls
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(batch_id)
        .bind(success)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(BatchRow::into_batch).transpose()
    }

    pub async fn set_batch_status(
        &self,
        id: i64,
        status: BatchStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE batch_scans
             SET status = $2,
                 completed_at = CASE WHEN $2 IN ('COMPLETED', 'FAILED', 'CANCELLED') THEN NOW() ELSE completed_at END,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn nullify_batch_email(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE batch_scans SET email = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Janitor sweep: RUNNING batches with no child progress inside the idle
    /// window become STALE. Returns how many were marked.
    pub async fn mark_stale_batches(&self, idle_minutes: i64) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE batch_scans
             SET status = 'STALE', updated_at = NOW()
             WHERE status = 'RUNNING'
               AND updated_at < NOW() - INTERVAL '1 minute' * $1",
        )
        .bind(idle_minutes)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    pub async fn delete_batch(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM batch_scans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}
