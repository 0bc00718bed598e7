//! Change state handed from the write path to live views.
//!
//! Every atomic write produces exactly one [`ChangeState`]. The view layer
//! uses it to decide membership changes without touching the inverted
//! index: `idx_data` carries the per-field token lists, summary values and
//! computed sort keys of the record as of this write.

use crate::models::ids::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Kind of write that produced a change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    Insert,
    Delete,
}

/// In-memory projection of one record as the index engine sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdxData {
    /// Computed sort values, keyed by sorter id.
    #[serde(default)]
    pub sorters: BTreeMap<String, Value>,

    /// Indexed tokens per field.
    #[serde(default)]
    pub words: BTreeMap<String, Vec<String>>,

    /// Canonical summary values for master-list fields.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl IdxData {
    /// Sort value for the given sorter id, if the record has one.
    pub fn sort_value(&self, sorter_id: &str) -> Option<&Value> {
        self.sorters.get(sorter_id)
    }

    /// True when the field's token list contains the token.
    pub fn has_token(&self, field_id: &str, token: &str) -> bool {
        self.words
            .get(field_id)
            .map(|tokens| tokens.iter().any(|t| t == token))
            .unwrap_or(false)
    }
}

/// What one atomic write did, as seen by the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeState {
    pub action: ChangeAction,
    pub id: RecordId,
    pub idx_data: IdxData,
    /// True when the write created the record.
    pub new_record: bool,
    /// Fields whose indexed projection changed in this write.
    pub changed: BTreeSet<String>,
}

impl ChangeState {
    pub fn insert(
        id: RecordId,
        idx_data: IdxData,
        new_record: bool,
        changed: BTreeSet<String>,
    ) -> Self {
        Self {
            action: ChangeAction::Insert,
            id,
            idx_data,
            new_record,
            changed,
        }
    }

    pub fn delete(id: RecordId, idx_data: IdxData) -> Self {
        let changed = idx_data.words.keys().cloned().collect();
        Self {
            action: ChangeAction::Delete,
            id,
            idx_data,
            new_record: false,
            changed,
        }
    }
}
