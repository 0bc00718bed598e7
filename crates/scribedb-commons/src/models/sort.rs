//! Sort direction, sort pairs and the shared value comparator.
//!
//! Both the index engine (`sort_records`) and the view layer (incremental
//! resort) order records the same way, so the comparator lives here.

use crate::models::ids::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction, serialised as `+1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum SortDir {
    Asc,
    Desc,
}

impl Default for SortDir {
    fn default() -> Self {
        SortDir::Asc
    }
}

impl SortDir {
    /// Apply the direction to an ascending ordering.
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    }
}

impl From<SortDir> for i8 {
    fn from(dir: SortDir) -> i8 {
        match dir {
            SortDir::Asc => 1,
            SortDir::Desc => -1,
        }
    }
}

impl TryFrom<i8> for SortDir {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortDir::Asc),
            -1 => Ok(SortDir::Desc),
            other => Err(format!("invalid sort direction {} (expected 1 or -1)", other)),
        }
    }
}

/// One entry of a materialised sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortPair {
    pub id: RecordId,
    pub value: Value,
}

impl SortPair {
    pub fn new(id: RecordId, value: Value) -> Self {
        Self { id, value }
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        Value::Null => String::new(),
        other => other.to_string().to_lowercase(),
    }
}

/// Compare two sort values ascending.
///
/// `numeric` selects number comparison (strings are parsed, unparseable
/// values sort first); otherwise values compare as case-folded text.
/// Missing/null values sort first either way.
pub fn compare_sort_values(a: &Value, b: &Value, numeric: bool) -> Ordering {
    if numeric {
        let fa = value_as_f64(a);
        let fb = value_as_f64(b);
        match (fa, fb) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    } else {
        value_as_text(a).cmp(&value_as_text(b))
    }
}

/// Full pair comparator: sort value under `numeric`/`dir`, then record id
/// ascending so ties are deterministic.
pub fn compare_sort_pairs(a: &SortPair, b: &SortPair, numeric: bool, dir: SortDir) -> Ordering {
    dir.apply(compare_sort_values(&a.value, &b.value, numeric))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_dir_serde() {
        assert_eq!(serde_json::to_string(&SortDir::Asc).unwrap(), "1");
        assert_eq!(serde_json::to_string(&SortDir::Desc).unwrap(), "-1");
        let dir: SortDir = serde_json::from_str("-1").unwrap();
        assert_eq!(dir, SortDir::Desc);
        assert!(serde_json::from_str::<SortDir>("0").is_err());
    }

    #[test]
    fn test_numeric_comparison_parses_strings() {
        assert_eq!(
            compare_sort_values(&json!("10"), &json!(9), true),
            Ordering::Greater
        );
        assert_eq!(
            compare_sort_values(&json!(1.5), &json!(1.5), true),
            Ordering::Equal
        );
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(
            compare_sort_values(&Value::Null, &json!("a"), false),
            Ordering::Less
        );
        assert_eq!(
            compare_sort_values(&Value::Null, &json!(0), true),
            Ordering::Less
        );
    }

    #[test]
    fn test_text_comparison_is_case_folded() {
        assert_eq!(
            compare_sort_values(&json!("Apple"), &json!("apple"), false),
            Ordering::Equal
        );
        assert_eq!(
            compare_sort_values(&json!("Banana"), &json!("apple"), false),
            Ordering::Greater
        );
    }

    #[test]
    fn test_pair_tie_break_by_id() {
        let a = SortPair::new(RecordId::new("2655"), json!("x"));
        let b = SortPair::new(RecordId::new("2653"), json!("x"));
        assert_eq!(
            compare_sort_pairs(&a, &b, false, SortDir::Asc),
            Ordering::Greater
        );
        // Direction does not flip the tie-break.
        assert_eq!(
            compare_sort_pairs(&a, &b, false, SortDir::Desc),
            Ordering::Greater
        );
    }

    #[test]
    fn test_descending_reverses_values() {
        let a = SortPair::new(RecordId::new("1"), json!(1));
        let b = SortPair::new(RecordId::new("2"), json!(2));
        assert_eq!(
            compare_sort_pairs(&a, &b, true, SortDir::Desc),
            Ordering::Greater
        );
    }
}
