use a11yscan_core::RepositoryError;

use crate::{db_err, Storage};

impl Storage {
    /// Atomic monthly counter bump. The first increment of a new month key
    /// creates the row, which is all the "reset" there is.
    pub async fn increment_usage(
        &self,
        subject: &str,
        month_key: &str,
    ) -> Result<i64, RepositoryError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO monthly_usage (subject, month_key, discovery_count)
             VALUES ($1, $2, 1)
             ON CONFLICT (subject, month_key)
             DO UPDATE SET discovery_count = monthly_usage.discovery_count + 1
             RETURNING discovery_count",
        )
        .bind(subject)
        .bind(month_key)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.0)
    }

    pub async fn get_usage(&self, subject: &str, month_key: &str) -> Result<i64, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT discovery_count FROM monthly_usage WHERE subject = $1 AND month_key = $2",
        )
        .bind(subject)
        .bind(month_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|(c,)| c).unwrap_or(0))
    }
}
