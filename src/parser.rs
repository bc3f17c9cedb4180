use crate::types::ReportPayload;
use thiserror::Error;
use tracing::error;

/// Model output that could not be decoded into a report.
///
/// Carries the untouched model output so it can be shown for debugging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("model returned invalid JSON ({reason}); please try again")]
pub struct ParseError {
    pub reason: String,
    pub raw: String,
}

/// Converts raw model output into a [`ReportPayload`].
///
/// Two stages: code-fence markers are stripped and whitespace trimmed, then the remainder must
/// decode as a JSON object with both `patterns` and `ideas`. Anything else is an error; an empty
/// report is never made up.
pub fn parse_report(raw: &str) -> Result<ReportPayload, ParseError> {
    let cleaned = strip_code_fences(raw);

    serde_json::from_str::<ReportPayload>(&cleaned).map_err(|e| {
        error!("Failed to parse model JSON: {}", e);
        ParseError {
            reason: e.to_string(),
            raw: raw.to_string(),
        }
    })
}

/// Removes every ```` ```json ```` and ```` ``` ```` marker and trims the result.
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}
