use super::{types::DetailedSummary, SummarizeError};

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Locates the JSON document inside a model answer: the first ```` ```json ````
/// fenced block wins, otherwise the span from the first `{` to the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find(FENCE_OPEN) {
        let body = &text[start + FENCE_OPEN.len()..];
        if let Some(end) = body.find(FENCE_CLOSE) {
            let candidate = body[..end].trim();
            if !candidate.is_empty() {
                return Some(candidate);
            }
        }
    }

    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close > open).then(|| &text[open..=close])
}

pub fn parse_detailed_summary(text: &str) -> Result<DetailedSummary, SummarizeError> {
    let block = extract_json_block(text).ok_or_else(|| {
        SummarizeError::InvalidResponse("no JSON object found in model answer".into())
    })?;

    let summary: DetailedSummary = serde_json::from_str(block)
        .map_err(|err| SummarizeError::InvalidResponse(format!("malformed summary JSON: {err}")))?;

    if summary.overview.trim().is_empty() && summary.key_points.is_empty() {
        return Err(SummarizeError::InvalidResponse(
            "summary JSON has neither an overview nor key points".into(),
        ));
    }

    Ok(summary)
}
