//! In-memory catalog of index schemas, persisted as one hash.
//!
//! All schemas live in the `<base>/indexes` hash (index id → schema JSON)
//! and are cached here for lock-free lookup. `base_path` is derived from
//! the configuration on every load and persist, never from stored data.

use crate::error::{Result, ScribeDbError};
use dashmap::DashMap;
use scribedb_commons::{Config, IndexName, IndexSchema};
use scribedb_store::{RecordStore, StoreError};
use std::sync::Arc;

pub struct IndexRegistry {
    config: Arc<Config>,
    store: Arc<RecordStore>,
    indexes: DashMap<IndexName, Arc<IndexSchema>>,
}

impl IndexRegistry {
    pub fn new(config: Arc<Config>, store: Arc<RecordStore>) -> Self {
        Self {
            config,
            store,
            indexes: DashMap::new(),
        }
    }

    /// Loads every persisted schema into the cache.
    pub async fn load(&self) -> Result<()> {
        let stored = self.store.hash_get_all(&self.config.indexes_path()).await?;
        for (id, value) in stored {
            let mut schema: IndexSchema =
                serde_json::from_value(value).map_err(StoreError::from)?;
            schema.base_path = self.config.index_base_path(&schema.id);
            log::debug!("loaded index schema '{}'", id);
            self.indexes.insert(schema.id.clone(), Arc::new(schema));
        }
        Ok(())
    }

    pub fn get(&self, index: &IndexName) -> Option<Arc<IndexSchema>> {
        self.indexes.get(index).map(|entry| entry.value().clone())
    }

    /// Lookup that maps a miss to the facade's `NotFound`.
    pub fn require(&self, index: &IndexName) -> Result<Arc<IndexSchema>> {
        self.get(index)
            .ok_or_else(|| ScribeDbError::NotFound(format!("index '{}'", index)))
    }

    pub fn contains(&self, index: &IndexName) -> bool {
        self.indexes.contains_key(index)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn all(&self) -> Vec<Arc<IndexSchema>> {
        self.indexes.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Writes the schema through to the persisted hash and refreshes the
    /// cache. Returns the cached entry.
    pub async fn persist(&self, mut schema: IndexSchema) -> Result<Arc<IndexSchema>> {
        schema.base_path = self.config.index_base_path(&schema.id);
        let value = serde_json::to_value(&schema).map_err(StoreError::from)?;
        self.store
            .hash_put(&self.config.indexes_path(), schema.id.as_str(), value)
            .await?;
        let schema = Arc::new(schema);
        self.indexes.insert(schema.id.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Drops the schema from storage and cache.
    pub async fn remove(&self, index: &IndexName) -> Result<()> {
        self.store
            .hash_delete(&self.config.indexes_path(), index.as_str())
            .await?;
        self.indexes.remove(index);
        Ok(())
    }
}
