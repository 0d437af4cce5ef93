//! JSON canonicalization

use serde_json::{Map, Value};

/// Parse JSON bytes and re-serialize with two-space indentation.
///
/// Object keys are emitted in sorted order, so the same structure always
/// produces the same text regardless of input formatting.
pub fn canonicalize_json(bytes: &[u8]) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    serde_json::to_string_pretty(&sort_keys(value))
}

// serde_json keeps insertion order when its `preserve_order` feature is
// enabled anywhere in the dependency graph; rebuild maps explicitly.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, v) in entries {
                sorted.insert(key, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
