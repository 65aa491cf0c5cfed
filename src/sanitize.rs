//! Null-stripping sanitizer (C2)
//!
//! Recursively removes null-valued entries from JSON to reduce payload
//! size before formatting, per `spec.md` §4.2.

use serde_json::{Map, Value};

/// Recursively strip null entries from `value`.
///
/// - Primitives pass through unchanged.
/// - A top-level `null` collapses to `Value::Null` ("absent").
/// - Object keys whose value is null are dropped; empty objects are kept.
/// - Array elements that are null are removed, shortening the array.
/// - `0`, `""`, and `false` are preserved — only `Value::Null` is stripped.
///
/// Always returns a freshly allocated value.
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                out.insert(k.clone(), strip_nulls(v));
            }
            Value::Object(out)
        }
    }
}
