//! Durations taken from synthesized audio, for the final resolution pass.

use narrate_core::composition::{ClipDecl, SegmentDecl};
use narrate_planner::durations::{DurationSource, EstimatedDurations};

use crate::scheduler::Artifacts;

/// Measured lengths where audio exists, estimates elsewhere.
pub struct MeasuredDurations<'a> {
    artifacts: &'a Artifacts,
    fallback: EstimatedDurations,
}

impl<'a> MeasuredDurations<'a> {
    pub fn new(artifacts: &'a Artifacts, fallback: EstimatedDurations) -> Self {
        Self {
            artifacts,
            fallback,
        }
    }
}

impl DurationSource for MeasuredDurations<'_> {
    fn segment_duration(&self, cue_id: &str, index: usize, segment: &SegmentDecl) -> f64 {
        match self.artifacts.segment(cue_id, index) {
            Some(a) => a.duration_sec,
            None => self.fallback.segment_duration(cue_id, index, segment),
        }
    }

    fn clip_duration(&self, clip: &ClipDecl) -> f64 {
        match self.artifacts.clip(&clip.id) {
            Some(a) => a.duration_sec,
            None => self.fallback.clip_duration(clip),
        }
    }
}
