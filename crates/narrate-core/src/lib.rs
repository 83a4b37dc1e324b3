#![forbid(unsafe_code)]
//! narrate-core: shared vocabulary for the timeline compiler.
//!
//! - [`composition`]: what authors declare (scenes, cues, transitions, marks, narration)
//! - [`timeline`]: resolved absolute timing and error breadcrumbs
//! - [`manifest`]: the per-environment synthesis cache manifest and run records
//! - [`config`]: compile/synthesis configuration with env overrides
//! - [`hash`]: stable blake3 content hashing
//!
//! No I/O here; higher layers own storage and providers.

pub mod composition;
pub mod config;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod prelude;
pub mod timeline;

pub use error::{Error, Result};

/// Engine version recorded in run records and manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Milliseconds since Unix epoch (UTC); 0 if the clock is before the epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
