//! Deterministic replay & provenance helpers.
//!
//! Digests are computed from serialized values. Identical composition,
//! configuration and cache contents produce identical timeline and manifest
//! digests, which is what a run record compares across runs.

use narrate_core::composition::Composition;
use narrate_core::hash::{hash_serde, Hash256};
use narrate_core::manifest::CacheManifest;
use narrate_core::timeline::ResolvedTimeline;
use narrate_planner::output::CompiledTimeline;

use crate::error::ExecError;

pub fn hash_composition(doc: &Composition) -> Result<Hash256, ExecError> {
    hash_serde(doc).map_err(|e| ExecError::Hash(e.to_string()))
}

pub fn hash_timeline(t: &ResolvedTimeline) -> Result<Hash256, ExecError> {
    hash_serde(t).map_err(|e| ExecError::Hash(e.to_string()))
}

pub fn hash_output(o: &CompiledTimeline) -> Result<Hash256, ExecError> {
    hash_serde(o).map_err(|e| ExecError::Hash(e.to_string()))
}

/// Digest of the manifest's keys and artifact paths/durations. Creation
/// times are left out so a copied entry hashes the same.
pub fn hash_manifest(m: &CacheManifest) -> Result<Hash256, ExecError> {
    let summary: Vec<(&str, Vec<(&str, f64)>, Option<f64>)> = m
        .entries
        .iter()
        .map(|(k, e)| {
            (
                k.as_str(),
                e.variants
                    .iter()
                    .map(|v| (v.path.as_str(), v.duration_sec))
                    .collect(),
                e.applied_trim_sec,
            )
        })
        .collect();
    hash_serde(&(&m.environment, summary)).map_err(|e| ExecError::Hash(e.to_string()))
}
