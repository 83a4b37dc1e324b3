#![forbid(unsafe_code)]
//! narrate-planner: from a (YAML) composition to an absolute timeline.
//!
//! Stages:
//! - [`dsl`]: YAML → [`Composition`](narrate_core::composition::Composition)
//! - [`lower`]: scene transition hints become standalone transitions
//! - [`prepare`]: id checks and a one-time parse of every time expression
//! - [`resolve`]: fixed-point evaluation against a [`DurationSource`]
//! - [`shift`]: overlap/insert transition propagation
//! - [`verify`]: ordering and containment checks on the final timeline
//! - [`output`]: the hand-off record for renderers
//!
//! No provider or storage access here; durations come in through a trait.

pub mod dsl;
pub mod durations;
pub mod error;
pub mod lower;
pub mod output;
pub mod prepare;
pub mod resolve;
pub mod shift;
pub mod verify;

use narrate_core::config::CompileConfig;
use narrate_core::timeline::ResolvedTimeline;

pub use dsl::yaml::parse_composition;
pub use durations::{DurationSource, EstimatedDurations};
pub use error::{CompileError, Result};
pub use lower::lower;
pub use output::{build_output, ArtifactLookup, CompiledTimeline, NoArtifacts};
pub use prepare::{prepare, PreparedComposition};
pub use resolve::{resolve, resolve_with, Invariants};
pub use shift::{apply_shifts, apply_shifts_with};
pub use verify::{verify, verify_spans};

/// Resolve, shift, and verify in one go.
pub fn plan(
    prepared: &PreparedComposition,
    config: &CompileConfig,
    durations: &dyn DurationSource,
) -> Result<ResolvedTimeline> {
    let resolved = resolve(prepared, config.fps, durations)?;
    let shifted = apply_shifts_with(&resolved, config.default_transition_sec);
    verify(&shifted)?;
    Ok(shifted)
}

/// Like [`plan`], for estimated durations: scene order and content
/// containment are left to the pass that sees measured audio.
pub fn plan_provisional(
    prepared: &PreparedComposition,
    config: &CompileConfig,
    durations: &dyn DurationSource,
) -> Result<ResolvedTimeline> {
    let resolved = resolve_with(prepared, config.fps, durations, Invariants::Defer)?;
    let shifted = apply_shifts_with(&resolved, config.default_transition_sec);
    verify_spans(&shifted)?;
    Ok(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERRUN: &str = r#"
items:
  - kind: scene
    id: a
    end: "2s"
    cues:
      - { id: c, text: "one two three four five six seven eight nine ten" }
"#;

    #[test]
    fn provisional_plan_defers_containment() {
        let prepared = prepare(lower(parse_composition(OVERRUN).unwrap())).unwrap();
        let cfg = CompileConfig::default();
        let estimates = EstimatedDurations::default();

        let t = plan_provisional(&prepared, &cfg, &estimates).unwrap();
        assert_eq!(t.find("a").unwrap().span().end, 2.0);
        assert!(matches!(
            plan(&prepared, &cfg, &estimates),
            Err(CompileError::Invariant { .. })
        ));
    }
}
