use chrono::{DateTime, Utc};
use sqlx::FromRow;

use a11yscan_core::{ReportArtifact, ReportFormat, ReportStatus, RepositoryError};

use crate::{bad_enum, db_err, Storage};

#[derive(FromRow)]
struct ReportRow {
    id: i64,
    scan_id: Option<i64>,
    batch_id: Option<i64>,
    format: String,
    status: String,
    url: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_artifact(self) -> Result<ReportArtifact, RepositoryError> {
        Ok(ReportArtifact {
            id: self.id,
            scan_id: self.scan_id,
            batch_id: self.batch_id,
            format: ReportFormat::parse(&self.format)
                .ok_or_else(|| bad_enum("format", &self.format))?,
            status: ReportStatus::parse(&self.status)
                .ok_or_else(|| bad_enum("status", &self.status))?,
            url: self.url,
            expires_at: self.expires_at,
            error_message: self.error_message,
            created_at: self.created_at,
        })
    }
}

const REPORT_COLUMNS: &str =
    "id, scan_id, batch_id, format, status, url, expires_at, error_message, created_at";

impl Storage {
    pub async fn create_report(
        &self,
        scan_id: Option<i64>,
        batch_id: Option<i64>,
        format: ReportFormat,
    ) -> Result<ReportArtifact, RepositoryError> {
        let row: ReportRow = sqlx::query_as(&format!(
            "INSERT INTO report_artifacts (scan_id, batch_id, format)
             VALUES ($1, $2, $3)
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(scan_id)
        .bind(batch_id)
        .bind(format.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.into_artifact()
    }

    pub async fn get_report(&self, id: i64) -> Result<Option<ReportArtifact>, RepositoryError> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM report_artifacts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(ReportRow::into_artifact).transpose()
    }

    pub async fn mark_report_ready(
        &self,
        id: i64,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE report_artifacts SET status = 'ready', url = $2, expires_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(url)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_report_failed(&self, id: i64, error: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE report_artifacts SET status = 'failed', error_message = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
