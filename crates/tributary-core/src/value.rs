//! Dot-path navigation and scalar canonicalization over JSON values

use serde_json::Value;

/// Resolve a dot-separated path like `"credentials.token"` or `"meta.total"`
/// against a JSON value.
///
/// Object segments are looked up by key; array segments accept a numeric
/// index. Returns `None` when any segment is missing.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a JSON value as the text stored in a canonical column.
///
/// `Null` maps to `None`; strings are taken as-is; numbers and booleans use
/// their JSON rendering. Nested structures are serialized compactly so a
/// mapped column never silently loses data.
pub fn scalar_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Render a resolved value as a token string for auth concatenation.
///
/// Strings are used without quoting; everything else falls back to its JSON
/// rendering.
pub fn value_to_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
