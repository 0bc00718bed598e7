//! The write path: lock → store → index → notify.
//!
//! Every record mutation holds the record key's exclusive lock for its
//! whole critical section; the guard releases on every exit path. View
//! notification only *enqueues* — fan-out happens on the background queue
//! after the writer has returned.
//!
//! A mid-sequence failure can leave body and index out of sync; the store
//! contract here is non-transactional and the caller re-issues the write.

use crate::error::{Result, ScribeDbError};
use scribedb_commons::{Config, IndexSchema, RecordId};
use scribedb_index::IndexEngine;
use scribedb_live::ViewManager;
use scribedb_store::RecordStore;
use serde_json::Value;
use std::sync::Arc;

pub struct Mutator {
    config: Arc<Config>,
    store: Arc<RecordStore>,
    engine: Arc<dyn IndexEngine>,
    views: Arc<ViewManager>,
}

impl Mutator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<RecordStore>,
        engine: Arc<dyn IndexEngine>,
        views: Arc<ViewManager>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            views,
        }
    }

    /// Unconditional write of a full record body.
    pub async fn insert(
        &self,
        schema: &Arc<IndexSchema>,
        id: &RecordId,
        record: Value,
    ) -> Result<()> {
        let key = self.config.record_path(&schema.id, id);
        let _lock = self.store.lock_exclusive(&key).await;

        self.store.put(&key, &record).await?;
        let state = self.engine.index_record(id, &record, schema).await?;
        self.views
            .update_views(&schema.id, Arc::clone(schema), state)?;
        Ok(())
    }

    /// Sparse merge with sugared string forms; read-modify-write under one
    /// lock. Returns the merged body.
    pub async fn update(
        &self,
        schema: &Arc<IndexSchema>,
        id: &RecordId,
        patch: &Value,
    ) -> Result<Value> {
        let key = self.config.record_path(&schema.id, id);
        let _lock = self.store.lock_exclusive(&key).await;

        let mut record = self.store.get(&key).await?.ok_or_else(|| {
            ScribeDbError::NotFound(format!("record '{}' in index '{}'", id, schema.id))
        })?;
        apply_patch(&mut record, patch)?;

        self.store.put(&key, &record).await?;
        let state = self.engine.index_record(id, &record, schema).await?;
        self.views
            .update_views(&schema.id, Arc::clone(schema), state)?;
        Ok(record)
    }

    /// Update through a caller-supplied transform over the loaded record.
    /// Returning `None` aborts the write with [`ScribeDbError::Aborted`].
    pub async fn update_with<F>(
        &self,
        schema: &Arc<IndexSchema>,
        id: &RecordId,
        transform: F,
    ) -> Result<Value>
    where
        F: FnOnce(Value) -> Option<Value>,
    {
        let key = self.config.record_path(&schema.id, id);
        let _lock = self.store.lock_exclusive(&key).await;

        let record = self.store.get(&key).await?.ok_or_else(|| {
            ScribeDbError::NotFound(format!("record '{}' in index '{}'", id, schema.id))
        })?;
        let record = transform(record).ok_or(ScribeDbError::Aborted)?;

        self.store.put(&key, &record).await?;
        let state = self.engine.index_record(id, &record, schema).await?;
        self.views
            .update_views(&schema.id, Arc::clone(schema), state)?;
        Ok(record)
    }

    /// Removes the record and its index projections.
    pub async fn delete(&self, schema: &Arc<IndexSchema>, id: &RecordId) -> Result<()> {
        let key = self.config.record_path(&schema.id, id);
        let _lock = self.store.lock_exclusive(&key).await;

        let state = self.engine.unindex_record(id, schema).await?;
        self.store.delete(&key).await?;
        self.views
            .update_views(&schema.id, Arc::clone(schema), state)?;
        Ok(())
    }
}

/// Sparse merge of `patch` into `current`.
///
/// String patch values get two sugared forms against the existing value:
/// `"+N"`/`"-N"` on a numeric field increments/decrements, and a string of
/// `±tag` tokens on a string field edits the comma-separated tag list.
/// Everything else replaces.
pub(crate) fn apply_patch(current: &mut Value, patch: &Value) -> Result<()> {
    let Value::Object(patch_map) = patch else {
        return Err(ScribeDbError::InvalidUpdate(
            "update patch must be an object".to_string(),
        ));
    };
    let Value::Object(current_map) = current else {
        return Err(ScribeDbError::InvalidUpdate(
            "record body is not an object".to_string(),
        ));
    };

    for (key, patch_value) in patch_map {
        let merged = match (current_map.get(key), patch_value) {
            (Some(existing), Value::String(text)) => {
                sugared_value(existing, text).unwrap_or_else(|| patch_value.clone())
            }
            _ => patch_value.clone(),
        };
        current_map.insert(key.clone(), merged);
    }
    Ok(())
}

fn sugared_value(existing: &Value, patch: &str) -> Option<Value> {
    if let Some(number) = existing.as_f64() {
        if is_signed_number(patch) {
            let delta: f64 = patch.parse().ok()?;
            let sum = number + delta;
            return Some(if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
                Value::from(sum as i64)
            } else {
                serde_json::Number::from_f64(sum)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            });
        }
        return None;
    }

    if let Some(text) = existing.as_str() {
        if is_tag_ops(patch) {
            return Some(Value::String(apply_tag_ops(text, patch)));
        }
    }
    None
}

fn is_signed_number(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('+').or_else(|| s.strip_prefix('-')) else {
        return false;
    };
    !rest.is_empty() && rest.parse::<f64>().is_ok()
}

fn tag_tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_tag_ops(s: &str) -> bool {
    let tokens = tag_tokens(s);
    !tokens.is_empty()
        && tokens
            .iter()
            .all(|t| (t.starts_with('+') || t.starts_with('-')) && t.len() > 1)
}

/// Applies `±tag` tokens left-to-right, deduplicates, re-joins with ", ".
fn apply_tag_ops(existing: &str, ops: &str) -> String {
    let mut tags: Vec<String> = Vec::new();
    for tag in existing.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    for op in tag_tokens(ops) {
        let (sign, tag) = op.split_at(1);
        if sign == "+" {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        } else {
            tags.retain(|t| t != tag);
        }
    }

    tags.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patched(mut record: Value, patch: Value) -> Value {
        apply_patch(&mut record, &patch).unwrap();
        record
    }

    #[test]
    fn test_plain_replace_and_sparse_merge() {
        let record = patched(
            json!({"Status": "Open", "Priority": 2}),
            json!({"Status": "Closed"}),
        );
        assert_eq!(record["Status"], "Closed");
        assert_eq!(record["Priority"], 2);
    }

    #[test]
    fn test_numeric_increment_and_decrement() {
        let record = patched(json!({"Votes": 10}), json!({"Votes": "+5"}));
        assert_eq!(record["Votes"], 15);

        let record = patched(json!({"Votes": 10}), json!({"Votes": "-3"}));
        assert_eq!(record["Votes"], 7);

        let record = patched(json!({"Score": 1.5}), json!({"Score": "+0.25"}));
        assert_eq!(record["Score"], 1.75);
    }

    #[test]
    fn test_plain_number_string_replaces() {
        // No sign, no sugar.
        let record = patched(json!({"Votes": 10}), json!({"Votes": "5"}));
        assert_eq!(record["Votes"], "5");
    }

    #[test]
    fn test_tag_add_and_remove() {
        let record = patched(json!({"Tags": "red, blue"}), json!({"Tags": "+green"}));
        assert_eq!(record["Tags"], "red, blue, green");

        let record = patched(json!({"Tags": "red, blue"}), json!({"Tags": "-red"}));
        assert_eq!(record["Tags"], "blue");
    }

    #[test]
    fn test_mixed_tag_ops_in_one_string() {
        let record = patched(
            json!({"Tags": "red, blue, blue"}),
            json!({"Tags": "+green, -red, +blue"}),
        );
        // Left-to-right, deduplicated, rejoined.
        assert_eq!(record["Tags"], "blue, green");
    }

    #[test]
    fn test_tag_ops_on_missing_key_replace() {
        let record = patched(json!({"Status": "Open"}), json!({"Tags": "+green"}));
        assert_eq!(record["Tags"], "+green");
    }

    #[test]
    fn test_non_sugar_string_replaces_string() {
        let record = patched(json!({"Summary": "Apples"}), json!({"Summary": "Watermelons"}));
        assert_eq!(record["Summary"], "Watermelons");
    }

    #[test]
    fn test_invalid_patch_shapes() {
        let mut record = json!({"a": 1});
        assert!(matches!(
            apply_patch(&mut record, &json!("nope")),
            Err(ScribeDbError::InvalidUpdate(_))
        ));

        let mut not_object = json!(42);
        assert!(matches!(
            apply_patch(&mut not_object, &json!({"a": 1})),
            Err(ScribeDbError::InvalidUpdate(_))
        ));
    }
}
