//! Pulling structured output out of model responses

use super::{GenerationError, TestCase};
use serde_json::Value;

/// Remove a surrounding Markdown code fence, if any.
///
/// An opening fence line (three backticks plus an optional language tag) and
/// a closing fence are dropped; text without a fence is returned trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            // single-line fence: drop the language tag
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a JSON document holding test cases.
///
/// Tries, in order:
/// 1. The fence-stripped text as JSON
/// 2. The first `[` to last `]` span (models sometimes add a preamble)
fn extract_json(text: &str) -> Option<Value> {
    let body = strip_code_fences(text);
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        return Some(v);
    }
    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&body[start..=end]) {
                return Some(v);
            }
        }
    }
    None
}

/// Parse and validate the test cases in a model response.
///
/// Accepts a bare array or a `{"test_cases": [...]}` plan. Any invalid record
/// rejects the whole response.
pub fn parse_test_cases(text: &str) -> Result<Vec<TestCase>, GenerationError> {
    let value = extract_json(text).ok_or_else(|| {
        GenerationError::Malformed(format!("response is not JSON: {}", preview(text)))
    })?;

    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut plan) => match plan.remove("test_cases") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(GenerationError::Malformed(
                    "expected a JSON array or an object with a \"test_cases\" array".to_string(),
                ))
            }
        },
        other => {
            return Err(GenerationError::Malformed(format!(
                "expected a JSON array of test cases, got {}",
                json_type(&other)
            )))
        }
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            TestCase::from_json(record).map_err(|reason| GenerationError::Schema { index, reason })
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
