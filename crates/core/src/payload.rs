//! Defensive extraction over schema-unstable provider payloads.
//!
//! Webhook deliveries and gateway responses carry no contractual shape: the
//! same logical field moves between key names and nesting levels across
//! provider versions. Callers describe the field as an ordered list of
//! dot-separated candidate paths and take the first present scalar.

use serde_json::Value;

/// Upper bound on dot-path depth. Provider payloads nest two or three
/// levels; anything deeper is noise and is not traversed.
const MAX_PATH_DEPTH: usize = 4;

/// Returns the first non-empty scalar found at any of the candidate paths,
/// coerced to a string.
pub fn string_at(root: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| value_at(root, path).and_then(scalar_to_string))
}

/// Resolves one dot-separated path against the payload, bounded by
/// [`MAX_PATH_DEPTH`].
pub fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for (depth, key) in path.split('.').enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Coerces a scalar payload value to a trimmed, non-empty string. Nulls,
/// arrays, and objects are absent values, matching how webhook fields are
/// normalized at the ingest boundary.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
