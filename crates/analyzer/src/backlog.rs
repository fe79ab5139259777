use std::io::Read;

use serde::{Deserialize, Serialize};

use a11yscan_core::{AiVerification, Issue, WcagLevel, WorkerError};

fn csv_err(e: impl std::fmt::Display) -> WorkerError {
    WorkerError::Other(anyhow::anyhow!("backlog csv: {e}"))
}

/// One pending scan exported for offline analysis. Existing issues travel
/// as a JSON column so downstream tooling keeps the full structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacklogRow {
    pub scan_id: i64,
    pub url: String,
    pub wcag_level: WcagLevel,
    pub existing_issues: Vec<Issue>,
}

/// The symmetric output row: what the analyzer concluded for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub scan_id: i64,
    pub url: String,
    pub wcag_level: WcagLevel,
    pub verifications: Vec<AiVerification>,
    pub tokens_used: i64,
}

pub fn write_backlog(rows: &[BacklogRow]) -> Result<Vec<u8>, WorkerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["scan_id", "url", "wcag_level", "existing_issues"])
        .map_err(csv_err)?;
    for row in rows {
        let issues_json = serde_json::to_string(&row.existing_issues).map_err(csv_err)?;
        writer
            .write_record([
                row.scan_id.to_string().as_str(),
                row.url.as_str(),
                row.wcag_level.as_str(),
                issues_json.as_str(),
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(csv_err)
}

pub fn read_backlog<R: Read>(reader: R) -> Result<Vec<BacklogRow>, WorkerError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(csv_err)?;
        let scan_id: i64 = record
            .get(0)
            .unwrap_or_default()
            .parse()
            .map_err(|e| csv_err(format!("bad scan_id: {e}")))?;
        let url = record.get(1).unwrap_or_default().to_string();
        let wcag_level = WcagLevel::parse(record.get(2).unwrap_or_default())
            .ok_or_else(|| csv_err(format!("bad wcag_level in row for scan {scan_id}")))?;
        let issues_json = record.get(3).unwrap_or("[]");
        let existing_issues: Vec<Issue> = if issues_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(issues_json).map_err(csv_err)?
        };
        rows.push(BacklogRow {
            scan_id,
            url,
            wcag_level,
            existing_issues,
        });
    }
    Ok(rows)
}

pub fn write_results(rows: &[ResultRow]) -> Result<Vec<u8>, WorkerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["scan_id", "url", "wcag_level", "verifications", "tokens_used"])
        .map_err(csv_err)?;
    for row in rows {
        let verifications_json = serde_json::to_string(&row.verifications).map_err(csv_err)?;
        writer
            .write_record([
                row.scan_id.to_string().as_str(),
                row.url.as_str(),
                row.wcag_level.as_str(),
                verifications_json.as_str(),
                row.tokens_used.to_string().as_str(),
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(csv_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use a11yscan_core::{Impact, VerificationStatus};

    fn issue() -> Issue {
        Issue {
            rule_id: "link-name".into(),
            impact: Impact::Serious,
            wcag_criteria: vec!["2.4.4".into(), "4.1.2".into()],
            description: "Link has no discernible text".into(),
            help_text: "Give links accessible names".into(),
            help_url: "https://rules.test/link-name".into(),
            html_snippet: None,
            css_selector: Some("a.icon-only".into()),
            ai_explanation: None,
            ai_fix_suggestion: None,
            ai_priority: None,
        }
    }

    #[test]
    fn backlog_round_trips_through_csv() {
        let rows = vec![
            BacklogRow {
                scan_id: 11,
                url: "https://example.com/a".into(),
                wcag_level: WcagLevel::Aa,
                existing_issues: vec![issue()],
            },
            BacklogRow {
                scan_id: 12,
                url: "https://example.com/b".into(),
                wcag_level: WcagLevel::A,
                existing_issues: vec![],
            },
        ];

        let bytes = write_backlog(&rows).unwrap();
        let parsed = read_backlog(bytes.as_slice()).unwrap();
        assert_eq!(parsed, rows);
        assert_eq!(parsed[0].existing_issues[0].wcag_criteria.len(), 2);
    }

    #[test]
    fn result_rows_embed_verifications_as_json() {
        let rows = vec![ResultRow {
            scan_id: 11,
            url: "https://example.com/a".into(),
            wcag_level: WcagLevel::Aa,
            verifications: vec![AiVerification {
                criterion_id: "2.4.4".into(),
                status: VerificationStatus::Fail,
                explanation: "icon links unnamed".into(),
                fix_suggestion: Some("add aria-label".into()),
                priority: Some(7),
            }],
            tokens_used: 812,
        }];
        let bytes = write_results(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("scan_id,url,wcag_level,verifications,tokens_used"));
        assert!(text.contains("2.4.4"));
        assert!(text.contains("812"));
    }

    #[test]
    fn rejects_malformed_rows() {
        let bad = "scan_id,url,wcag_level,existing_issues\nnot-a-number,https://x,AA,[]\n";
        assert!(read_backlog(bad.as_bytes()).is_err());
        let bad_level = "scan_id,url,wcag_level,existing_issues\n1,https://x,ULTRA,[]\n";
        assert!(read_backlog(bad_level.as_bytes()).is_err());
    }
}
