//! Decoding of structured (JSON) model responses.
//!
//! Both agents share the same pipeline: pull the text out of the first
//! candidate, strip an optional markdown fence, parse JSON, pick the
//! top-level array and validate each element on its own. Invalid
//! elements are dropped with a warning.

use crate::error::{JudgeError, JudgeResult, ValidationError};
use model::{GenerateResponse, ResponseText};
use serde_json::Value;
use tracing::warn;

/// Text of the first candidate, or a response format error naming what was missing.
pub fn response_text(response: &GenerateResponse) -> JudgeResult<String> {
    match response.first_text() {
        ResponseText::Text(text) => Ok(text),
        ResponseText::Missing(reason) => Err(JudgeError::ResponseFormat(reason.to_string())),
    }
}

/// Remove a leading "```json" / "```" and a trailing "```" if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_json(text: &str) -> JudgeResult<Value> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|e| JudgeError::Parse(format!("response is not valid JSON: {}", e)))
}

/// Take the array stored under `field` out of a top-level object.
pub fn extract_array(value: Value, field: &str) -> JudgeResult<Vec<Value>> {
    let Value::Object(mut object) = value else {
        return Err(JudgeError::ResponseFormat(format!(
            "expected a JSON object with a '{}' array",
            field
        )));
    };

    match object.remove(field) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(JudgeError::ResponseFormat(format!(
            "'{}' is not an array",
            field
        ))),
        None => Err(JudgeError::ResponseFormat(format!(
            "response has no '{}' field",
            field
        ))),
    }
}

/// Validate items one by one, keeping the survivors in their original order.
pub fn collect_valid<T, F>(items: Vec<Value>, kind: &str, mut validate: F) -> Vec<T>
where
    F: FnMut(usize, Value) -> Result<T, ValidationError>,
{
    let total = items.len();
    let valid: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match validate(index, item) {
            Ok(valid) => Some(valid),
            Err(e) => {
                warn!("Dropping invalid {}: {}", kind, e);
                None
            }
        })
        .collect();

    if valid.len() < total {
        warn!("Kept {} of {} {} items", valid.len(), total, kind);
    }
    valid
}

/// Pretty-print a document summary, cutting it to at most `limit` characters.
///
/// A truncated summary ends with `... [truncated N characters]`, and the
/// marker counts toward `limit`. When `limit` is too small to hold the
/// marker, the text is cut without one.
pub fn summarize_document(document: &Value, limit: usize) -> String {
    let text = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    let total = text.chars().count();
    if total <= limit {
        return text;
    }

    // The marker length depends on the dropped count, which depends on the
    // marker length; the count only shrinks, so this settles in a few rounds.
    let mut dropped = total;
    let marker = loop {
        let marker = format!("\n... [truncated {} characters]", dropped);
        let kept = limit.saturating_sub(marker.chars().count());
        if total - kept == dropped {
            break marker;
        }
        dropped = total - kept;
    };

    let marker_len = marker.chars().count();
    if marker_len >= limit {
        return text.chars().take(limit).collect();
    }

    let mut truncated: String = text.chars().take(limit - marker_len).collect();
    truncated.push_str(&marker);
    truncated
}

/// MIME type of a raster snapshot, from its magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        // PNG is what renderers produce by default
        "image/png"
    }
}
