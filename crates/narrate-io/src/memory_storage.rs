//! In-memory storage backend for testing.
//!
//! HashMap-backed; selected by `memory://` cache roots so tests avoid file I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::storage::Storage;

/// Thread-safe in-memory storage. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the number of stored objects
    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Clear all stored data
    pub fn clear(&self) {
        self.data().clear();
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.data().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.data()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("path not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.data().contains_key(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.data().remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut result: Vec<String> = self
            .data()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    fn size(&self, path: &str) -> Result<u64> {
        self.data()
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| Error::Storage(format!("path not found: {path}")))
    }
}
