use chrono::{DateTime, Utc};
use sqlx::FromRow;

use a11yscan_core::{
    DiscoveredPage, Discovery, DiscoveryMode, DiscoveryPhase, DiscoveryStatus, PageSource,
    RepositoryError,
};

use crate::{bad_enum, db_err, Storage};

#[derive(FromRow)]
struct DiscoveryRow {
    id: i64,
    session_id: String,
    homepage_url: String,
    mode: String,
    status: String,
    phase: String,
    max_pages: i32,
    max_depth: i32,
    partial_results: bool,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl DiscoveryRow {
    fn into_discovery(self) -> Result<Discovery, RepositoryError> {
        Ok(Discovery {
            id: self.id,
            session_id: self.session_id,
            homepage_url: self.homepage_url,
            mode: DiscoveryMode::parse(&self.mode).ok_or_else(|| bad_enum("mode", &self.mode))?,
            status: DiscoveryStatus::parse(&self.status)
                .ok_or_else(|| bad_enum("status", &self.status))?,
            phase: DiscoveryPhase::parse(&self.phase)
                .ok_or_else(|| bad_enum("phase", &self.phase))?,
            max_pages: self.max_pages.max(0) as u32,
            max_depth: self.max_depth.max(0) as u32,
            partial_results: self.partial_results,
            error_code: self.error_code,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
struct PageRow {
    id: i64,
    discovery_id: i64,
    url: String,
    title: Option<String>,
    source: String,
    depth: i32,
    http_status: Option<i32>,
    content_type: Option<String>,
    created_at: DateTime<Utc>,
}

impl PageRow {
    fn into_page(self) -> Result<DiscoveredPage, RepositoryError> {
        Ok(DiscoveredPage {
            id: self.id,
            discovery_id: self.discovery_id,
            url: self.url,
            title: self.title,
            source: PageSource::parse(&self.source)
                .ok_or_else(|| bad_enum("source", &self.source))?,
            depth: self.depth.max(0) as u32,
            http_status: self.http_status.map(|s| s as u16),
            content_type: self.content_type,
            created_at: self.created_at,
        })
    }
}

const DISCOVERY_COLUMNS: &str = "id, session_id, homepage_url, mode, status, phase, max_pages, \
     max_depth, partial_results, error_code, error_message, created_at, updated_at, started_at, \
     completed_at";

pub struct NewDiscovery<'a> {
    pub session_id: &'a str,
    pub homepage_url: &'a str,
    pub mode: DiscoveryMode,
    pub max_pages: u32,
    pub max_depth: u32,
}

impl Storage {
    pub async fn create_discovery(
        &self,
        new: NewDiscovery<'_>,
    ) -> Result<Discovery, RepositoryError> {
        let row: DiscoveryRow = sqlx::query_as(&format!(
            "INSERT INTO discoveries (session_id, homepage_url, mode, max_pages, max_depth)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {DISCOVERY_COLUMNS}"
        ))
        .bind(new.session_id)
        .bind(new.homepage_url)
        .bind(new.mode.as_str())
        .bind(new.max_pages as i32)
        .bind(new.max_depth as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_discovery()
    }

    pub async fn get_discovery(&self, id: i64) -> Result<Option<Discovery>, RepositoryError> {
        let row: Option<DiscoveryRow> =
            sqlx::query_as(&format!("SELECT {DISCOVERY_COLUMNS} FROM discoveries WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(DiscoveryRow::into_discovery).transpose()
    }

    /// Claim a PENDING discovery for its single writer. Returns false when
    /// the row is missing or already past PENDING.
    pub async fn mark_discovery_running(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE discoveries
             SET status = 'RUNNING', phase = 'SITEMAP', started_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_discovery_phase(
        &self,
        id: i64,
        phase: DiscoveryPhase,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE discoveries SET phase = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(phase.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn finish_discovery(
        &self,
        id: i64,
        status: DiscoveryStatus,
        partial_results: bool,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE discoveries
             SET status = $2, phase = 'NONE', partial_results = $3, error_code = $4,
                 error_message = $5, completed_at = NOW(), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(partial_results)
        .bind(error_code)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Cooperative cancellation flag, observed by the engine at each await
    /// point. Only non-terminal discoveries accept the request.
    pub async fn request_discovery_cancel(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE discoveries SET cancel_requested = TRUE, updated_at = NOW()
             WHERE id = $1 AND status IN ('PENDING', 'RUNNING')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_discovery_cancel_requested(&self, id: i64) -> Result<bool, RepositoryError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM discoveries WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(|(c,)| c).unwrap_or(false))
    }

    /// Append one page. Returns None when `(discovery_id, url)` already
    /// exists — the canonical-dedup invariant lives in the unique index.
    pub async fn insert_page(
        &self,
        discovery_id: i64,
        url: &str,
        title: Option<&str>,
        source: PageSource,
        depth: u32,
        http_status: Option<u16>,
        content_type: Option<&str>,
    ) -> Result<Option<i64>, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO discovered_pages (discovery_id, url, title, source, depth, http_status, content_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (discovery_id, url) DO NOTHING
             RETURNING id",
        )
        .bind(discovery_id)
        .bind(url)
        .bind(title)
        .bind(source.as_str())
        .bind(depth as i32)
        .bind(http_status.map(|s| s as i32))
        .bind(content_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(id,)| id))
    }

    pub async fn update_page_fetch_result(
        &self,
        page_id: i64,
        http_status: Option<u16>,
        content_type: Option<&str>,
        title: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE discovered_pages
             SET http_status = $2, content_type = $3, title = COALESCE($4, title)
             WHERE id = $1",
        )
        .bind(page_id)
        .bind(http_status.map(|s| s as i32))
        .bind(content_type)
        .bind(title)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn list_pages(
        &self,
        discovery_id: i64,
    ) -> Result<Vec<DiscoveredPage>, RepositoryError> {
        let rows: Vec<PageRow> = sqlx::query_as(
            "SELECT id, discovery_id, url, title, source, depth, http_status, content_type, created_at
             FROM discovered_pages WHERE discovery_id = $1 ORDER BY id",
        )
        .bind(discovery_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PageRow::into_page).collect()
    }

    pub async fn count_pages(&self, discovery_id: i64) -> Result<i64, RepositoryError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM discovered_pages WHERE discovery_id = $1")
                .bind(discovery_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.0)
    }

    /// Only MANUAL pages can be removed one by one.
    pub async fn remove_manual_page(
        &self,
        discovery_id: i64,
        url: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM discovered_pages
             WHERE discovery_id = $1 AND url = $2 AND source = 'MANUAL'",
        )
        .bind(discovery_id)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_discovery(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM discoveries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}
