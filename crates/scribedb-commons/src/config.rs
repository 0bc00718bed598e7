//! Store configuration and key-layout helpers.
//!
//! The whole persisted layout hangs off `base_path`:
//!
//! ```text
//! <base>/indexes                  — hash: index_id → schema JSON
//! <base>/index/<id>/...           — index engine bookkeeping
//! <base>/records/<index>/<id>     — record bodies
//! ```

use crate::models::ids::{IndexName, RecordId};
use serde::{Deserialize, Serialize};

/// Configuration for one ScribeDB instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Storage-key prefix under which everything lives.
    pub base_path: String,

    /// Page size for paged hash iteration (admin record snapshots).
    #[serde(default = "default_hash_page_size")]
    pub hash_page_size: usize,
}

fn default_hash_page_size() -> usize {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: "scribedb".to_string(),
            hash_page_size: default_hash_page_size(),
        }
    }
}

impl Config {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Key of the hash mapping index ids to schemas.
    pub fn indexes_path(&self) -> String {
        format!("{}/indexes", self.base_path)
    }

    /// Storage-key prefix owned by one index's engine bookkeeping.
    pub fn index_base_path(&self, index: &IndexName) -> String {
        format!("{}/index/{}", self.base_path, index)
    }

    /// Key of one record body.
    pub fn record_path(&self, index: &IndexName, id: &RecordId) -> String {
        format!("{}/records/{}/{}", self.base_path, index, id)
    }

    /// Key prefix of all record bodies in one index.
    pub fn records_prefix(&self, index: &IndexName) -> String {
        format!("{}/records/{}/", self.base_path, index)
    }
}
