//! Convenient re-exports for downstream crates.

pub use crate::composition::{
    ClipDecl, ClipKind, Composition, CueDecl, CueItem, MarkDecl, NarrationDecl, OverflowAudio,
    SceneDecl, TimeExpr, TimelineItem, TransitionDecl, TransitionMode,
};
pub use crate::config::{CompileConfig, SynthConfig};
pub use crate::error::{Error, Result};
pub use crate::hash::{hash_serde, Hash256};
pub use crate::manifest::{
    manifest_key, ArtifactRecord, CacheManifest, ManifestEntry, RunId, RunRecord, RunStats,
    UnitKind,
};
pub use crate::timeline::{
    Breadcrumb, PlacedClip, ResolvedItem, ResolvedScene, ResolvedTimeline, ResolvedTransition,
    Span,
};
