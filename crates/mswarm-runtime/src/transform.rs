//! The fixed transform and filter vocabulary applied to step results.
//! Unknown names pass values through unchanged.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use mswarm_core::types::{display_value, is_truthy};

pub fn apply_transform(name: &str, value: Value) -> Value {
    match name {
        "to_string" => Value::String(display_value(&value)),
        "to_json" => Value::String(value.to_string()),
        "extract_text" => match value {
            Value::Object(ref map) => map
                .get("text")
                .cloned()
                .unwrap_or_else(|| Value::String(value.to_string())),
            other => Value::String(display_value(&other)),
        },
        other => {
            debug!(transform = other, "Unknown transform, passing value through");
            value
        }
    }
}

pub fn apply_filter(name: &str, value: Value) -> Value {
    match name {
        "non_empty" => match value {
            Value::Array(items) => Value::Array(items.into_iter().filter(is_truthy).collect()),
            other if !is_truthy(&other) => Value::Null,
            other => other,
        },
        // First occurrence wins, so output order is stable.
        "unique" => match value {
            Value::Array(items) => {
                let mut seen = HashSet::with_capacity(items.len());
                Value::Array(
                    items
                        .into_iter()
                        .filter(|item| seen.insert(item.to_string()))
                        .collect(),
                )
            }
            other => other,
        },
        other => {
            debug!(filter = other, "Unknown filter, passing value through");
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_string() {
        assert_eq!(apply_transform("to_string", json!("already")), json!("already"));
        assert_eq!(apply_transform("to_string", json!(42)), json!("42"));
        assert_eq!(apply_transform("to_string", json!({"a": 1})), json!("{\"a\":1}"));
    }

    #[test]
    fn test_to_json_quotes_strings() {
        assert_eq!(apply_transform("to_json", json!("hi")), json!("\"hi\""));
        assert_eq!(apply_transform("to_json", json!([1, 2])), json!("[1,2]"));
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(
            apply_transform("extract_text", json!({"text": "body", "meta": 1})),
            json!("body")
        );
        assert_eq!(
            apply_transform("extract_text", json!({"other": 1})),
            json!("{\"other\":1}")
        );
        assert_eq!(apply_transform("extract_text", json!(7)), json!("7"));
    }

    #[test]
    fn test_unknown_names_are_identity() {
        assert_eq!(apply_transform("upcase", json!("x")), json!("x"));
        assert_eq!(apply_filter("evens", json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(
            apply_filter("non_empty", json!(["a", "", null, 0, [], "b"])),
            json!(["a", "b"])
        );
        assert_eq!(apply_filter("non_empty", json!("")), Value::Null);
        assert_eq!(apply_filter("non_empty", json!("keep")), json!("keep"));
    }

    #[test]
    fn test_unique_keeps_first_occurrence() {
        assert_eq!(
            apply_filter("unique", json!(["b", "a", "b", 1, "a", 1])),
            json!(["b", "a", 1])
        );
        assert_eq!(apply_filter("unique", json!("scalar")), json!("scalar"));
    }

    #[test]
    fn test_unique_distinguishes_types_and_scales() {
        assert_eq!(
            apply_filter("unique", json!(["1", 1, {"k": [1]}, {"k": [1]}, null, null])),
            json!(["1", 1, {"k": [1]}, null])
        );

        let items: Vec<Value> = (0..20_000).map(|i| json!(i % 100)).collect();
        let deduped = apply_filter("unique", Value::Array(items));
        let expected: Vec<Value> = (0..100).map(|i| json!(i)).collect();
        assert_eq!(deduped, Value::Array(expected));
    }
}
