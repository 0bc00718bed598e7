//! File-system storage backend.
//!
//! One file per key under a base directory; the `/`-separated key becomes
//! the relative path. Key segments are validated word characters upstream,
//! so keys map onto paths without escaping.

use crate::storage_trait::{Result, StorageBackend, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Storage backend persisting each key as a file.
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Opens (and creates if missing) the base directory.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_dir.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn collect_keys(&self, dir: &Path, rel: &str, out: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() {
                name
            } else {
                format!("{}/{}", rel, name)
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect_keys(&entry.path(), &child_rel, out)?;
            } else {
                out.push(child_rel);
            }
        }
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, value)
            .map_err(|e| StoreError::Io(format!("write {}: {}", path.display(), e)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(&self.base_dir, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn len(&self) -> Result<usize> {
        let mut keys = Vec::new();
        self.collect_keys(&self.base_dir, "", &mut keys)?;
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.put("db/records/app/2653", b"{\"a\":1}").unwrap();
        assert_eq!(
            backend.get("db/records/app/2653").unwrap().as_deref(),
            Some(&b"{\"a\":1}"[..])
        );

        backend.delete("db/records/app/2653").unwrap();
        assert_eq!(backend.get("db/records/app/2653").unwrap(), None);
    }

    #[test]
    fn test_list_prefix_walks_directories() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("db/index/app/_id", b"{}").unwrap();
        backend.put("db/index/app/word/status/open", b"{}").unwrap();
        backend.put("db/indexes", b"{}").unwrap();

        let keys = backend.list_prefix("db/index/app/").unwrap();
        assert_eq!(keys, vec!["db/index/app/_id", "db/index/app/word/status/open"]);
        assert_eq!(backend.len().unwrap(), 3);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.get("nope/nothing").unwrap(), None);
        backend.delete("nope/nothing").unwrap();
    }
}
