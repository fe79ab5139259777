use serde::Deserialize;

use a11yscan_core::{AiVerification, InferenceError, VerificationStatus, WcagLevel};

use crate::criteria::Criterion;

/// Page HTML beyond this is cut before prompting; the tail of a huge
/// document adds tokens, not signal.
const MAX_HTML_CHARS: usize = 120_000;

pub fn build_prompt(
    scan_id: i64,
    url: &str,
    level: WcagLevel,
    criteria: &[&'static Criterion],
    html: &str,
) -> String {
    let mut instructions = String::new();
    for criterion in criteria {
        instructions.push_str(&format!(
            "- {} ({}): {}\n",
            criterion.id, criterion.name, criterion.instruction
        ));
    }

    let html_excerpt: String = html.chars().take(MAX_HTML_CHARS).collect();

    format!(
        "You are an accessibility auditor. Verify the page below against these WCAG {level} \
         success criteria:\n{instructions}\n\
         Page URL: {url}\n\
         Page HTML:\n```html\n{html_excerpt}\n```\n\
         Respond with ONLY a JSON object, no prose, in this exact shape:\n\
         {{\"scanId\": {scan_id}, \"verifications\": [{{\"criterionId\": \"1.1.1\", \
         \"status\": \"pass|fail|cannot_tell\", \"explanation\": \"...\", \
         \"fixSuggestion\": \"...\", \"priority\": 1}}]}}\n\
         Include one verification per criterion listed above. `priority` ranges from 1 \
         (cosmetic) to 10 (blocks access); omit it for passing criteria.",
        level = level.as_str(),
        instructions = instructions,
        url = url,
        html_excerpt = html_excerpt,
        scan_id = scan_id,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    scan_id: Option<i64>,
    #[serde(default)]
    verifications: Vec<RawVerification>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerification {
    criterion_id: String,
    status: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    fix_suggestion: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
}

/// Parse the model's output. Tolerates code fences and surrounding prose,
/// but a missing or mismatched `scanId` is an `INVALID_OUTPUT` failure —
/// the result must provably belong to this scan.
pub fn parse_output(output: &str, expected_scan_id: i64) -> Result<Vec<AiVerification>, InferenceError> {
    let start = output
        .find('{')
        .ok_or_else(|| InferenceError::InvalidOutput("no JSON object in output".into()))?;
    let end = output
        .rfind('}')
        .ok_or_else(|| InferenceError::InvalidOutput("unterminated JSON object".into()))?;
    if end < start {
        return Err(InferenceError::InvalidOutput("malformed JSON envelope".into()));
    }

    let raw: RawResponse = serde_json::from_str(&output[start..=end])
        .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;

    match raw.scan_id {
        Some(id) if id == expected_scan_id => {}
        Some(id) => {
            return Err(InferenceError::InvalidOutput(format!(
                "scanId mismatch: expected {expected_scan_id}, got {id}"
            )))
        }
        None => return Err(InferenceError::InvalidOutput("scanId missing".into())),
    }

    if raw.verifications.is_empty() {
        return Err(InferenceError::InvalidOutput("no verifications".into()));
    }

    Ok(raw
        .verifications
        .into_iter()
        .map(|v| AiVerification {
            criterion_id: v.criterion_id,
            status: match v.status.as_str() {
                "pass" => VerificationStatus::Pass,
                "fail" => VerificationStatus::Fail,
                _ => VerificationStatus::CannotTell,
            },
            explanation: v.explanation,
            fix_suggestion: v.fix_suggestion,
            priority: v.priority.map(|p| p.clamp(1, 10) as u8),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::criteria_for_level;

    #[test]
    fn prompt_names_every_criterion_and_the_scan() {
        let criteria = criteria_for_level(WcagLevel::A);
        let group = &criteria[..5];
        let prompt = build_prompt(42, "https://example.com/", WcagLevel::A, group, "<html></html>");
        for criterion in group {
            assert!(prompt.contains(criterion.id), "{} missing", criterion.id);
        }
        assert!(prompt.contains("\"scanId\": 42"));
        assert!(prompt.contains("https://example.com/"));
    }

    #[test]
    fn parses_a_clean_response() {
        let output = r#"{"scanId": 7, "verifications": [
            {"criterionId": "1.1.1", "status": "fail", "explanation": "missing alt",
             "fixSuggestion": "add alt text", "priority": 8},
            {"criterionId": "1.3.1", "status": "pass", "explanation": "structure ok"}
        ]}"#;
        let verifications = parse_output(output, 7).unwrap();
        assert_eq!(verifications.len(), 2);
        assert_eq!(verifications[0].status, VerificationStatus::Fail);
        assert_eq!(verifications[0].priority, Some(8));
        assert_eq!(verifications[1].status, VerificationStatus::Pass);
    }

    #[test]
    fn tolerates_code_fences_and_prose() {
        let output = "Here is the audit:\n```json\n{\"scanId\": 3, \"verifications\": \
                      [{\"criterionId\": \"2.4.2\", \"status\": \"pass\"}]}\n```\nDone.";
        let verifications = parse_output(output, 3).unwrap();
        assert_eq!(verifications.len(), 1);
        assert_eq!(verifications[0].criterion_id, "2.4.2");
    }

    #[test]
    fn rejects_missing_or_mismatched_scan_id() {
        let missing = r#"{"verifications": [{"criterionId": "1.1.1", "status": "pass"}]}"#;
        assert!(matches!(
            parse_output(missing, 1),
            Err(InferenceError::InvalidOutput(_))
        ));

        let mismatched = r#"{"scanId": 99, "verifications": [{"criterionId": "1.1.1", "status": "pass"}]}"#;
        assert!(matches!(
            parse_output(mismatched, 1),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(matches!(
            parse_output("I could not analyze the page.", 1),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn unknown_status_maps_to_cannot_tell_and_priority_clamps() {
        let output = r#"{"scanId": 5, "verifications": [
            {"criterionId": "1.4.3", "status": "unsure", "priority": 40}
        ]}"#;
        let verifications = parse_output(output, 5).unwrap();
        assert_eq!(verifications[0].status, VerificationStatus::CannotTell);
        assert_eq!(verifications[0].priority, Some(10));
    }
}
