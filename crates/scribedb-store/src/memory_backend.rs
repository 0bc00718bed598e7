//! In-memory storage backend.
//!
//! The default backend for embedded use and tests. Lock-free concurrent
//! access via `DashMap`; data lives for the lifetime of the process.

use crate::storage_trait::{Result, StorageBackend};
use dashmap::DashMap;

/// Process-lifetime storage backend backed by a concurrent map.
#[derive(Default)]
pub struct MemoryBackend {
    data: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}
