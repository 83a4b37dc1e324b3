//! Where segment and clip lengths come from during resolution.

use narrate_core::composition::{ClipDecl, SegmentDecl};

/// Supplies the lengths the resolver cannot compute from expressions alone.
///
/// Cue ids are unique across the composition, so `(cue_id, index)` names a
/// speech segment; clip ids are unique too.
pub trait DurationSource {
    fn segment_duration(&self, cue_id: &str, index: usize, segment: &SegmentDecl) -> f64;
    fn clip_duration(&self, clip: &ClipDecl) -> f64;
}

/// Pre-synthesis estimates: words at a fixed speaking rate, clip hints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatedDurations {
    pub words_per_minute: f64,
    pub min_sec: f64,
}

impl EstimatedDurations {
    pub fn new(words_per_minute: f64, min_sec: f64) -> Self {
        Self {
            words_per_minute,
            min_sec,
        }
    }

    pub fn speech_estimate(&self, text: &str) -> f64 {
        let words = text.split_whitespace().count() as f64;
        (words * 60.0 / self.words_per_minute).max(self.min_sec)
    }
}

impl Default for EstimatedDurations {
    fn default() -> Self {
        Self::new(150.0, 0.25)
    }
}

impl DurationSource for EstimatedDurations {
    fn segment_duration(&self, _cue_id: &str, _index: usize, segment: &SegmentDecl) -> f64 {
        self.speech_estimate(&segment.text)
    }

    fn clip_duration(&self, clip: &ClipDecl) -> f64 {
        clip.duration.unwrap_or(0.0)
    }
}
