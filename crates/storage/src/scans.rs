use chrono::{DateTime, Utc};
use sqlx::FromRow;

use a11yscan_core::{
    AiStatus, Impact, Issue, RepositoryError, Scan, ScanResult, ScanStatus, WcagLevel,
};

use crate::{bad_enum, db_err, Storage};

#[derive(FromRow)]
struct ScanRow {
    id: i64,
    session_id: Option<String>,
    user_id: Option<String>,
    batch_id: Option<i64>,
    url: String,
    wcag_level: String,
    email: Option<String>,
    status: String,
    duration_ms: Option<i64>,
    error_message: Option<String>,
    ai_enabled: bool,
    ai_status: Option<String>,
    ai_tokens_used: i64,
    ai_duration_ms: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ScanRow {
    fn into_scan(self) -> Result<Scan, RepositoryError> {
        let ai_status = match self.ai_status {
            Some(s) => Some(AiStatus::parse(&s).ok_or_else(|| bad_enum("ai_status", &s))?),
            None => None,
        };
        Ok(Scan {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            batch_id: self.batch_id,
            url: self.url,
            wcag_level: WcagLevel::parse(&self.wcag_level)
                .ok_or_else(|| bad_enum("wcag_level", &self.wcag_level))?,
            email: self.email,
            status: ScanStatus::parse(&self.status)
                .ok_or_else(|| bad_enum("status", &self.status))?,
            duration_ms: self.duration_ms,
            error_message: self.error_message,
            ai_enabled: self.ai_enabled,
            ai_status,
            ai_tokens_used: self.ai_tokens_used,
            ai_duration_ms: self.ai_duration_ms,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(FromRow)]
struct IssueRow {
    rule_id: String,
    impact: String,
    wcag_criteria: Vec<String>,
    description: String,
    help_text: String,
    help_url: String,
    html_snippet: Option<String>,
    css_selector: Option<String>,
    ai_explanation: Option<String>,
    ai_fix_suggestion: Option<String>,
    ai_priority: Option<i32>,
}

impl IssueRow {
    fn into_issue(self) -> Result<Issue, RepositoryError> {
        Ok(Issue {
            rule_id: self.rule_id,
            impact: Impact::parse(&self.impact).ok_or_else(|| bad_enum("impact", &self.impact))?,
            wcag_criteria: self.wcag_criteria,
            description: self.description,
            help_text: self.help_text,
            help_url: self.help_url,
            html_snippet: self.html_snippet,
            css_selector: self.css_selector,
            ai_explanation: self.ai_explanation,
            ai_fix_suggestion: self.ai_fix_suggestion,
            ai_priority: self.ai_priority.map(|p| p.clamp(1, 10) as u8),
        })
    }
}

const SCAN_COLUMNS: &str = "id, session_id, user_id, batch_id, url, wcag_level, email, status, \
     duration_ms, error_message, ai_enabled, ai_status, ai_tokens_used, ai_duration_ms, \
     created_at, updated_at, completed_at";

pub struct NewScan<'a> {
    pub session_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub batch_id: Option<i64>,
    pub url: &'a str,
    pub wcag_level: WcagLevel,
    pub email: Option<&'a str>,
    pub ai_enabled: bool,
}

impl Storage {
    pub async fn create_scan(&self, new: NewScan<'_>) -> Result<Scan, RepositoryError> {
        let ai_status = if new.ai_enabled { Some("PENDING") } else { None };
        let row: ScanRow = sqlx::query_as(&format!(
            "INSERT INTO scans (session_id, user_id, batch_id, url, wcag_level, email, ai_enabled, ai_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {SCAN_COLUMNS}"
        ))
        .bind(new.session_id)
        .bind(new.user_id)
        .bind(new.batch_id)
        .bind(new.url)
        .bind(new.wcag_level.as_str())
        .bind(new.email)
        .bind(new.ai_enabled)
        .bind(ai_status)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_scan()
    }

    pub async fn get_scan(&self, id: i64) -> Result<Option<Scan>, RepositoryError> {
        let row: Option<ScanRow> =
            sqlx::query_as(&format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(ScanRow::into_scan).transpose()
    }

    pub async fn mark_scan_running(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE scans SET status = 'RUNNING', updated_at = NOW()
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist a finished audit in one transaction: scan status, aggregate
    /// counts, and the ordered issue list. Re-running replaces the previous
    /// rows, which keeps the processor idempotent.
    pub async fn complete_scan(
        &self,
        id: i64,
        duration_ms: i64,
        result: &ScanResult,
        issues: &[Issue],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "UPDATE scans
             SET status = 'COMPLETED', duration_ms = $2, error_message = NULL,
                 completed_at = NOW(), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(duration_ms)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO scan_results (scan_id, total_issues, critical_count, serious_count,
                 moderate_count, minor_count, passed_checks, inapplicable_checks)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (scan_id) DO UPDATE SET
                 total_issues = EXCLUDED.total_issues,
                 critical_count = EXCLUDED.critical_count,
                 serious_count = EXCLUDED.serious_count,
                 moderate_count = EXCLUDED.moderate_count,
                 minor_count = EXCLUDED.minor_count,
                 passed_checks = EXCLUDED.passed_checks,
                 inapplicable_checks = EXCLUDED.inapplicable_checks",
        )
        .bind(id)
        .bind(result.total_issues)
        .bind(result.critical_count)
        .bind(result.serious_count)
        .bind(result.moderate_count)
        .bind(result.minor_count)
        .bind(result.passed_checks)
        .bind(result.inapplicable_checks)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM issues WHERE scan_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if !issues.is_empty() {
            let mut positions: Vec<i32> = Vec::with_capacity(issues.len());
            let mut rule_ids: Vec<String> = Vec::with_capacity(issues.len());
            let mut impacts: Vec<String> = Vec::with_capacity(issues.len());
            let mut criteria: Vec<String> = Vec::with_capacity(issues.len());
            let mut descriptions: Vec<String> = Vec::with_capacity(issues.len());
            let mut help_texts: Vec<String> = Vec::with_capacity(issues.len());
            let mut help_urls: Vec<String> = Vec::with_capacity(issues.len());
            let mut snippets: Vec<Option<String>> = Vec::with_capacity(issues.len());
            let mut selectors: Vec<Option<String>> = Vec::with_capacity(issues.len());
            for (position, issue) in issues.iter().enumerate() {
                positions.push(position as i32);
                rule_ids.push(issue.rule_id.clone());
                impacts.push(issue.impact.as_str().to_string());
                // arrays-of-arrays don't UNNEST cleanly; criteria travel as csv
                criteria.push(issue.wcag_criteria.join(","));
                descriptions.push(issue.description.clone());
                help_texts.push(issue.help_text.clone());
                help_urls.push(issue.help_url.clone());
                snippets.push(issue.html_snippet.clone());
                selectors.push(issue.css_selector.clone());
            }
            sqlx::query(
                "INSERT INTO issues (scan_id, position, rule_id, impact, wcag_criteria,
                     description, help_text, help_url, html_snippet, css_selector)
                 SELECT $1, t.position, t.rule_id, t.impact, string_to_array(NULLIF(t.criteria, ''), ','),
                        t.description, t.help_text, t.help_url, t.snippet, t.selector
                 FROM UNNEST($2::int[], $3::text[], $4::text[], $5::text[], $6::text[],
                             $7::text[], $8::text[], $9::text[], $10::text[])
                      AS t(position, rule_id, impact, criteria, description, help_text, help_url, snippet, selector)",
            )
            .bind(id)
            .bind(&positions)
            .bind(&rule_ids)
            .bind(&impacts)
            .bind(&criteria)
            .bind(&descriptions)
            .bind(&help_texts)
            .bind(&help_urls)
            .bind(&snippets)
            .bind(&selectors)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn fail_scan(
        &self,
        id: i64,
        error_message: &str,
        duration_ms: Option<i64>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE scans
             SET status = 'FAILED', error_message = $2, duration_ms = COALESCE($3, duration_ms),
                 completed_at = NOW(), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .bind(duration_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// GDPR: drop the stored address once a notification has been delivered
    /// or permanently failed.
    pub async fn nullify_scan_email(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE scans SET email = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_scan_result(
        &self,
        scan_id: i64,
    ) -> Result<Option<ScanResult>, RepositoryError> {
        let row: Option<(i32, i32, i32, i32, i32, i32, i32)> = sqlx::query_as(
            "SELECT total_issues, critical_count, serious_count, moderate_count, minor_count,
                    passed_checks, inapplicable_checks
             FROM scan_results WHERE scan_id = $1",
        )
        .bind(scan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(
            |(total, critical, serious, moderate, minor, passed, inapplicable)| ScanResult {
                total_issues: total,
                critical_count: critical,
                serious_count: serious,
                moderate_count: moderate,
                minor_count: minor,
                passed_checks: passed,
                inapplicable_checks: inapplicable,
            },
        ))
    }

    pub async fn list_issues(&self, scan_id: i64) -> Result<Vec<Issue>, RepositoryError> {
        let rows: Vec<IssueRow> = sqlx::query_as(
            "SELECT rule_id, impact, wcag_criteria, description, help_text, help_url,
                    html_snippet, css_selector, ai_explanation, ai_fix_suggestion, ai_priority
             FROM issues WHERE scan_id = $1 ORDER BY position",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(IssueRow::into_issue).collect()
    }

    pub async fn set_ai_status(
        &self,
        scan_id: i64,
        status: AiStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE scans SET ai_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(scan_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn add_ai_counters(
        &self,
        scan_id: i64,
        tokens_delta: i64,
        duration_delta_ms: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE scans
             SET ai_tokens_used = ai_tokens_used + $2,
                 ai_duration_ms = ai_duration_ms + $3,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(scan_id)
        .bind(tokens_delta)
        .bind(duration_delta_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Backlog for the analyzer: completed scans with AI requested but not
    /// yet finished.
    pub async fn list_pending_ai_scans(&self, limit: i64) -> Result<Vec<Scan>, RepositoryError> {
        let rows: Vec<ScanRow> = sqlx::query_as(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans
             WHERE ai_enabled AND status = 'COMPLETED' AND ai_status IN ('PENDING', 'PROCESSING')
             ORDER BY id LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(ScanRow::into_scan).collect()
    }

    pub async fn list_scans(
        &self,
        session_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Scan>, RepositoryError> {
        let rows: Vec<ScanRow> = match session_id {
            Some(session) => {
                sqlx::query_as(&format!(
                    "SELECT {SCAN_COLUMNS} FROM scans WHERE session_id = $1
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
                    "SELECT {SCAN_COLUMNS} FROM scans ORDER BY id DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?
            }
        };

        rows.into_iter().map(ScanRow::into_scan).collect()
    }

    pub async fn list_batch_scans(&self, batch_id: i64) -> Result<Vec<Scan>, RepositoryError> {
        let rows: Vec<ScanRow> = sqlx::query_as(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE batch_id = $1 ORDER BY id"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(ScanRow::into_scan).collect()
    }

    pub async fn delete_scan(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM scans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}
