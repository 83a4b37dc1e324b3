//! Artifact storage.
//!
//! Every path handed to a [`Storage`] is relative to the cache root
//! (`dev/manifest.json`, `dev/segments/ab/<hex>-0.wav`) and always uses `/`.
//!
//! - `fs`: local filesystem rooted at a directory (default).
//! - [`MemoryStorage`](crate::memory_storage::MemoryStorage): `memory://` roots, for tests.

mod fs;
pub use fs::FsStorage;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::memory_storage::MemoryStorage;

/// Abstract storage for cache artifacts and metadata.
pub trait Storage: Send + Sync {
    /// Write bytes to a path, replacing any previous content.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the whole object at a path.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Whether an object exists at a path.
    fn exists(&self, path: &str) -> bool;

    /// Delete a path. Idempotent (no error if path doesn't exist).
    fn delete(&self, path: &str) -> Result<()>;

    /// All object paths starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Size of an object in bytes.
    fn size(&self, path: &str) -> Result<u64>;
}

/// Build the backend for a cache root (`memory://...`, `file://...` or a bare path).
pub fn build_storage(root: &str) -> Result<Arc<dyn Storage>> {
    match root.split_once("://") {
        Some(("memory", _)) => Ok(Arc::new(MemoryStorage::new())),
        Some(("file", path)) => Ok(Arc::new(FsStorage::new(path))),
        None => Ok(Arc::new(FsStorage::new(root))),
        Some((other, _)) => Err(Error::Config(format!("unsupported cache root scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_backend_by_scheme() {
        let mem = build_storage("memory://cache").unwrap();
        mem.write("dev/x", b"1").unwrap();
        assert!(mem.exists("dev/x"));

        assert!(build_storage("s3://bucket").is_err());
    }
}
