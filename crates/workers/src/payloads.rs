use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPagePayload {
    pub scan_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReportPayload {
    pub report_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    ScanComplete,
    ScanFailed,
    BatchComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailPayload {
    #[serde(default)]
    pub scan_id: Option<i64>,
    #[serde(default)]
    pub batch_id: Option<i64>,
    pub email: String,
    pub kind: EmailKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReportPayload {
    pub batch_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_kind_uses_snake_case_on_the_wire() {
        let payload = SendEmailPayload {
            scan_id: Some(9),
            batch_id: None,
            email: "user@example.com".into(),
            kind: EmailKind::ScanComplete,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "scan_complete");

        let parsed: SendEmailPayload =
            serde_json::from_value(serde_json::json!({
                "email": "user@example.com",
                "kind": "batch_complete",
                "batch_id": 4
            }))
            .unwrap();
        assert_eq!(parsed.kind, EmailKind::BatchComplete);
        assert_eq!(parsed.scan_id, None);
    }
}
