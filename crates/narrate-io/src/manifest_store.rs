//! Per-environment manifest persistence.

use std::sync::Arc;

use tracing::{debug, warn};

use narrate_core::manifest::{CacheManifest, MANIFEST_VERSION};

use crate::error::Result;
use crate::layout;
use crate::storage::Storage;

#[derive(Clone)]
pub struct ManifestStore {
    storage: Arc<dyn Storage>,
}

impl ManifestStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load an environment's manifest. A missing file is an empty manifest;
    /// so is one written by an incompatible version.
    pub fn load(&self, env: &str) -> Result<CacheManifest> {
        let path = layout::manifest_path(env);
        if !self.storage.exists(&path) {
            debug!(env, "no manifest yet");
            return Ok(CacheManifest::new(env));
        }
        let bytes = self.storage.read(&path)?;
        let manifest: CacheManifest = serde_json::from_slice(&bytes)?;
        if manifest.version != MANIFEST_VERSION {
            warn!(
                env,
                found = manifest.version,
                expected = MANIFEST_VERSION,
                "manifest version mismatch; starting empty"
            );
            return Ok(CacheManifest::new(env));
        }
        debug!(env, entries = manifest.len(), "manifest loaded");
        Ok(manifest)
    }

    /// Like [`Self::load`], but `None` when the environment has no manifest.
    pub fn load_existing(&self, env: &str) -> Result<Option<CacheManifest>> {
        if self.storage.exists(&layout::manifest_path(env)) {
            self.load(env).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn save(&self, manifest: &CacheManifest) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        self.storage
            .write(&layout::manifest_path(&manifest.environment), &bytes)
    }

    /// Drop an environment's manifest (artifacts stay on disk).
    pub fn discard(&self, env: &str) -> Result<()> {
        self.storage.delete(&layout::manifest_path(env))
    }
}

#[cfg(test)]
mod tests {
    use narrate_core::manifest::{ArtifactRecord, ManifestEntry, UnitKind};

    use super::*;
    use crate::memory_storage::MemoryStorage;

    fn entry() -> ManifestEntry {
        ManifestEntry {
            kind: UnitKind::Speech,
            provider: "silent".into(),
            source: "hello".into(),
            sample_rate: 24_000,
            format: "wav".into(),
            variants: vec![ArtifactRecord {
                path: "dev/segments/ab/x-0.wav".into(),
                duration_sec: 1.0,
            }],
            applied_trim_sec: None,
            created_ms: 1,
        }
    }

    #[test]
    fn missing_is_empty_and_save_roundtrips() {
        let store = ManifestStore::new(Arc::new(MemoryStorage::new()));
        assert!(store.load("dev").unwrap().is_empty());
        assert!(store.load_existing("dev").unwrap().is_none());

        let mut m = CacheManifest::new("dev");
        m.insert("k-0".into(), entry());
        store.save(&m).unwrap();
        assert_eq!(store.load("dev").unwrap(), m);

        store.discard("dev").unwrap();
        assert!(store.load("dev").unwrap().is_empty());
    }

    #[test]
    fn foreign_version_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        let store = ManifestStore::new(storage.clone());
        let mut m = CacheManifest::new("dev");
        m.version = MANIFEST_VERSION + 1;
        m.insert("k-0".into(), entry());
        store.save(&m).unwrap();
        assert!(store.load("dev").unwrap().is_empty());
    }
}
