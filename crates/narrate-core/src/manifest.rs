//! Synthesis cache manifest and run records.
//!
//! One [`CacheManifest`] per environment maps `<hex>-<occurrence>` keys to the
//! artifacts produced for that unit. A [`RunRecord`] summarizes a single
//! compilation for audit/replay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::composition::ClipKind;
use crate::hash::Hash256;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Speech,
    Sfx,
    Music,
}

impl UnitKind {
    /// Directory under `<root>/<env>/` holding this kind's artifacts.
    pub fn dir(self) -> &'static str {
        match self {
            UnitKind::Speech => "segments",
            UnitKind::Sfx => "sfx",
            UnitKind::Music => "music",
        }
    }

    /// Speech is required; clips degrade gracefully.
    pub fn is_required(self) -> bool {
        matches!(self, UnitKind::Speech)
    }
}

impl From<ClipKind> for UnitKind {
    fn from(k: ClipKind) -> Self {
        match k {
            ClipKind::Sfx => UnitKind::Sfx,
            ClipKind::Music => UnitKind::Music,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnitKind::Speech => "speech",
            UnitKind::Sfx => "sfx",
            UnitKind::Music => "music",
        })
    }
}

/// Manifest key: `<hex>-<occurrence>`.
pub fn manifest_key(key: &Hash256, occurrence: u32) -> String {
    format!("{}-{}", key.to_hex(), occurrence)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Path relative to the cache root.
    pub path: String,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: UnitKind,
    pub provider: String,
    /// Spoken text or generation prompt.
    pub source: String,
    pub sample_rate: u32,
    pub format: String,
    /// One record per variant; speech always has exactly one.
    pub variants: Vec<ArtifactRecord>,
    /// Seconds trimmed from the end, when the trim hint was honoured.
    #[serde(default)]
    pub applied_trim_sec: Option<f64>,
    pub created_ms: u64,
}

impl ManifestEntry {
    /// Duration of variant `pick` after trimming.
    pub fn effective_duration(&self, pick: usize) -> Option<f64> {
        let v = self.variants.get(pick)?;
        Some((v.duration_sec - self.applied_trim_sec.unwrap_or(0.0)).max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub environment: String,
    /// Ordered for byte-stable serialization.
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl CacheManifest {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            environment: environment.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: ManifestEntry) {
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters gathered by the scheduler during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub units: u64,
    pub cache_hits: u64,
    pub fallback_hits: u64,
    pub provider_calls: u64,
    pub provider_failures: u64,
    pub resyntheses: u64,
    pub placeholders: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,

    /// Stable hash of the composition as declared.
    pub composition_hash: Hash256,

    /// Stable hash of the final resolved timeline.
    pub timeline_hash: Option<Hash256>,

    /// Stable hash of the manifest after the run.
    pub manifest_hash: Option<Hash256>,

    /// Engine version string for provenance.
    pub engine_version: String,

    pub environment: String,
    pub stats: RunStats,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunRecord {
    pub fn new(composition_hash: Hash256, environment: impl Into<String>, started_ms: u64) -> Self {
        Self {
            id: RunId::new(),
            composition_hash,
            timeline_hash: None,
            manifest_hash: None,
            engine_version: crate::VERSION.to_string(),
            environment: environment.into(),
            stats: RunStats::default(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(
        mut self,
        finished_ms: u64,
        timeline_hash: Hash256,
        manifest_hash: Hash256,
        stats: RunStats,
    ) -> Self {
        self.finished_ms = finished_ms;
        self.timeline_hash = Some(timeline_hash);
        self.manifest_hash = Some(manifest_hash);
        self.stats = stats;
        self
    }
}
