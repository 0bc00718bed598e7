//! Resolution of field/sorter `source` paths into record values.
//!
//! A source is a `/`-separated path into the record tree, e.g. `/Status` or
//! `/Comments/Comment/length`. A segment that names a missing key resolves
//! to the container's element count when the segment is `length` and the
//! container is an array or string. Array segments may also be numeric
//! indexes.

use serde_json::Value;

/// Resolves `source` against `record`, or `None` when the path misses.
pub fn resolve(record: &Value, source: &str) -> Option<Value> {
    let mut current = record;
    for segment in source.split('/').filter(|s| !s.is_empty()) {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                if segment == "length" {
                    return Some(Value::from(items.len()));
                }
                match segment.parse::<usize>() {
                    Ok(idx) => current = items.get(idx)?,
                    Err(_) => return None,
                }
            }
            Value::String(s) => {
                if segment == "length" {
                    return Some(Value::from(s.chars().count()));
                }
                return None;
            }
            _ => return None,
        }
    }
    Some(current.clone())
}

/// Renders a resolved value as indexable text.
///
/// Arrays join their elements with spaces; objects and nulls render empty.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) | Value::Null => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket() -> Value {
        json!({
            "Status": "Open",
            "Summary": "Apples and pears",
            "Comments": {
                "Comment": [
                    {"Text": "first"},
                    {"Text": "second"}
                ]
            }
        })
    }

    #[test]
    fn test_plain_key() {
        assert_eq!(resolve(&ticket(), "/Status"), Some(json!("Open")));
    }

    #[test]
    fn test_nested_length() {
        assert_eq!(resolve(&ticket(), "/Comments/Comment/length"), Some(json!(2)));
    }

    #[test]
    fn test_string_length() {
        assert_eq!(resolve(&json!({"Name": "abc"}), "/Name/length"), Some(json!(3)));
    }

    #[test]
    fn test_array_index() {
        assert_eq!(
            resolve(&ticket(), "/Comments/Comment/0/Text"),
            Some(json!("first"))
        );
    }

    #[test]
    fn test_missing_path() {
        assert_eq!(resolve(&ticket(), "/Nope"), None);
        assert_eq!(resolve(&ticket(), "/Status/Deeper"), None);
    }

    #[test]
    fn test_explicit_length_key_wins() {
        let record = json!({"Box": {"length": 99}});
        assert_eq!(resolve(&record, "/Box/length"), Some(json!(99)));
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("abc")), "abc");
        assert_eq!(value_text(&json!(3.5)), "3.5");
        assert_eq!(value_text(&json!(["a", "b"])), "a b");
        assert_eq!(value_text(&json!(null)), "");
    }
}
