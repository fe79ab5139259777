use chrono::{DateTime, Utc};
use sqlx::FromRow;

use a11yscan_core::{AiVerification, Checkpoint, RepositoryError, WcagLevel};

use crate::{bad_enum, db_err, Storage};

#[derive(FromRow)]
struct CheckpointRow {
    scan_id: i64,
    url: String,
    wcag_level: String,
    total_batches: i32,
    completed_batches: Vec<i32>,
    tokens_used: i64,
    updated_at: DateTime<Utc>,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<Checkpoint, RepositoryError> {
        let mut completed = self.completed_batches;
        completed.sort_unstable();
        Ok(Checkpoint {
            scan_id: self.scan_id,
            url: self.url,
            wcag_level: WcagLevel::parse(&self.wcag_level)
                .ok_or_else(|| bad_enum("wcag_level", &self.wcag_level))?,
            total_batches: self.total_batches,
            completed_batches: completed,
            tokens_used: self.tokens_used,
            updated_at: self.updated_at,
        })
    }
}

const CHECKPOINT_COLUMNS: &str =
    "scan_id, url, wcag_level, total_batches, completed_batches, tokens_used, updated_at";

impl Storage {
    /// Create the checkpoint row if it doesn't exist yet, otherwise return
    /// the surviving one so a restarted run resumes where it stopped.
    pub async fn init_checkpoint(
        &self,
        scan_id: i64,
        url: &str,
        wcag_level: WcagLevel,
        total_batches: i32,
    ) -> Result<Checkpoint, RepositoryError> {
        let row: CheckpointRow = sqlx::query_as(&format!(
            "INSERT INTO ai_checkpoints (scan_id, url, wcag_level, total_batches)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (scan_id) DO UPDATE SET updated_at = NOW()
             RETURNING {CHECKPOINT_COLUMNS}"
        ))
        .bind(scan_id)
        .bind(url)
        .bind(wcag_level.as_str())
        .bind(total_batches)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_checkpoint()
    }

    pub async fn get_checkpoint(
        &self,
        scan_id: i64,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let row: Option<CheckpointRow> = sqlx::query_as(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM ai_checkpoints WHERE scan_id = $1"
        ))
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// Fold one finished mini-batch into the checkpoint. The array union is
    /// done in SQL so the set only ever grows, and indices outside
    /// `[0, total_batches)` are refused.
    pub async fn record_completed_batch(
        &self,
        scan_id: i64,
        batch_index: i32,
        tokens_delta: i64,
    ) -> Result<Checkpoint, RepositoryError> {
        let row: Option<CheckpointRow> = sqlx::query_as(&format!(
            "UPDATE ai_checkpoints
             SET completed_batches = (
                     SELECT ARRAY(SELECT DISTINCT t.b FROM UNNEST(completed_batches || $2::int) AS t(b) ORDER BY t.b)
                 ),
                 tokens_used = tokens_used + $3,
                 updated_at = NOW()
             WHERE scan_id = $1 AND $2 >= 0 AND $2 < total_batches
             RETURNING {CHECKPOINT_COLUMNS}"
        ))
        .bind(scan_id)
        .bind(batch_index)
        .bind(tokens_delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.into_checkpoint(),
            None => Err(RepositoryError::Conflict(format!(
                "batch index {batch_index} outside checkpoint bounds for scan {scan_id}"
            ))),
        }
    }

    pub async fn list_verifications(
        &self,
        scan_id: i64,
    ) -> Result<Vec<AiVerification>, RepositoryError> {
        let rows: Vec<(String, String, String, Option<String>, Option<i32>)> = sqlx::query_as(
            "SELECT criterion_id, status, explanation, fix_suggestion, priority
             FROM ai_verifications WHERE scan_id = $1 ORDER BY criterion_id",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|(criterion_id, status, explanation, fix_suggestion, priority)| {
                Ok(AiVerification {
                    criterion_id,
                    status: a11yscan_core::VerificationStatus::parse(&status)
                        .ok_or_else(|| bad_enum("status", &status))?,
                    explanation,
                    fix_suggestion,
                    priority: priority.map(|p| p.clamp(1, 10) as u8),
                })
            })
            .collect()
    }

    pub async fn delete_checkpoint(&self, scan_id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM ai_checkpoints WHERE scan_id = $1")
            .bind(scan_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Store the criterion judgements from one mini-batch and mirror them
    /// onto issues citing those criteria.
    pub async fn store_verifications(
        &self,
        scan_id: i64,
        batch_index: i32,
        verifications: &[AiVerification],
    ) -> Result<(), RepositoryError> {
        if verifications.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for v in verifications {
            sqlx::query(
                "INSERT INTO ai_verifications (scan_id, criterion_id, batch_index, status, explanation, fix_suggestion, priority)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (scan_id, criterion_id) DO UPDATE SET
                     batch_index = EXCLUDED.batch_index,
                     status = EXCLUDED.status,
                     explanation = EXCLUDED.explanation,
                     fix_suggestion = EXCLUDED.fix_suggestion,
                     priority = EXCLUDED.priority",
            )
            .bind(scan_id)
            .bind(&v.criterion_id)
            .bind(batch_index)
            .bind(v.status.as_str())
            .bind(&v.explanation)
            .bind(&v.fix_suggestion)
            .bind(v.priority.map(|p| p as i32))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "UPDATE issues
                 SET ai_explanation = $3, ai_fix_suggestion = $4, ai_priority = $5
                 WHERE scan_id = $1 AND $2 = ANY(wcag_criteria)",
            )
            .bind(scan_id)
            .bind(&v.criterion_id)
            .bind(&v.explanation)
            .bind(&v.fix_suggestion)
            .bind(v.priority.map(|p| p as i32))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
