//! Variant selections: clip id → chosen variant index, per environment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layout;
use crate::storage::Storage;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selections(pub BTreeMap<String, usize>);

impl Selections {
    /// Missing file means no selections.
    pub fn load(storage: &dyn Storage, env: &str) -> Result<Self> {
        let path = layout::selections_path(env);
        if !storage.exists(&path) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&storage.read(&path)?)?)
    }

    pub fn save(&self, storage: &dyn Storage, env: &str) -> Result<()> {
        storage.write(
            &layout::selections_path(env),
            &serde_json::to_vec_pretty(self)?,
        )
    }

    pub fn get(&self, clip_id: &str) -> Option<usize> {
        self.0.get(clip_id).copied()
    }

    pub fn set(&mut self, clip_id: impl Into<String>, pick: usize) {
        self.0.insert(clip_id.into(), pick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::MemoryStorage;

    #[test]
    fn load_save() {
        let storage = MemoryStorage::new();
        assert_eq!(Selections::load(&storage, "dev").unwrap(), Selections::default());

        storage
            .write("dev/selections.json", br#"{"whoosh": 2}"#)
            .unwrap();
        let mut sel = Selections::load(&storage, "dev").unwrap();
        assert_eq!(sel.get("whoosh"), Some(2));
        assert_eq!(sel.get("bed"), None);

        sel.set("bed", 1);
        sel.save(&storage, "prod").unwrap();
        assert_eq!(Selections::load(&storage, "prod").unwrap(), sel);
    }
}
