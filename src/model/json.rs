//! Loose accessors over untyped API payloads.
//!
//! Weibo responses change shape between endpoints, so fields are read through
//! ordered key paths with empty fallbacks instead of typed structs.

use serde_json::{Map, Value};

/// Whether a value counts as present: non-null, non-zero, non-empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Plain display form of a value; strings are returned without quotes.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Display form of an optional value, empty unless it is truthy.
pub fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(v) if is_truthy(v) => display(v),
        _ => String::new(),
    }
}

/// Display form of the first truthy value among `keys`.
pub fn first_text(obj: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| is_truthy(v))
        .map(display)
        .unwrap_or_default()
}

/// Follow a key path through nested objects.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// The object stored at `key`, if it is one.
pub fn object_at<'a>(value: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    value.get(key).and_then(Value::as_object)
}

/// The array stored at `key`, or an empty slice.
pub fn array_at<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Collect every value stored under `key` anywhere in the tree, depth first.
pub fn walk_for_key<'a>(node: &'a Value, key: &str, results: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    results.push(v);
                }
                walk_for_key(v, key, results);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_for_key(item, key, results);
            }
        }
        _ => {}
    }
}
