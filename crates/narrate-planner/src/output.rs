//! Hand-off timeline for renderers and muxers.

use serde::{Deserialize, Serialize};

use narrate_core::composition::{ClipDecl, Composition, CueItem, EnvelopePoint, OverflowAudio};
use narrate_core::manifest::UnitKind;
use narrate_core::timeline::{PlacedClip, ResolvedItem, ResolvedTimeline};

/// Where synthesized audio ended up. Implemented by the synthesis report.
pub trait ArtifactLookup {
    /// Cache-root-relative path and effective duration of a speech segment.
    fn segment(&self, cue_id: &str, index: usize) -> Option<(String, f64)>;
    /// Path of the chosen variant of a clip.
    fn clip(&self, clip_id: &str) -> Option<(String, f64)>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTimeline {
    pub fps: f64,
    pub duration_sec: f64,
    pub scenes: Vec<SceneRecord>,
    pub transitions: Vec<TransitionRecord>,
    pub marks: Vec<MarkRecord>,
    pub audio: Vec<AudioTrackClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub enter: Option<String>,
    pub exit: Option<String>,
    pub layers: Vec<LayerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub components: Vec<ComponentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub start: f64,
    pub end: f64,
    pub props: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub effect: Option<String>,
    pub mode: Option<narrate_core::composition::TransitionMode>,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkRecord {
    pub id: String,
    pub at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackClip {
    /// Clip id, or `<cue>#<segment>` for speech.
    pub clip_id: String,
    pub kind: UnitKind,
    pub start: f64,
    /// Cache-root-relative artifact path; `None` for a silent placeholder.
    pub source: Option<String>,
    pub volume: f64,
    pub max_duration: Option<f64>,
    pub envelope: Vec<EnvelopePoint>,
}

/// Build the hand-off record. Audio clips are ordered by start, then id.
pub fn build_output(
    timeline: &ResolvedTimeline,
    doc: &Composition,
    artifacts: &dyn ArtifactLookup,
) -> CompiledTimeline {
    let mut scenes = Vec::new();
    let mut transitions = Vec::new();
    let mut marks = Vec::new();
    let mut audio = Vec::new();

    let clip_decl = |id: &str| -> Option<&ClipDecl> {
        doc.items.iter().find_map(|it| {
            it.clips().iter().find(|c| c.id == id).or_else(|| {
                it.cues().iter().find_map(|c| match c {
                    CueItem::Cue(c) => c.audio.iter().find(|a| a.id == id),
                    CueItem::Pause(_) => None,
                })
            })
        })
    };
    // `cap`: latest point the clip may sound until, if its owner cuts it off.
    let mut push_clip = |placed: &PlacedClip, cap: Option<f64>| {
        let decl = clip_decl(&placed.clip_id);
        let declared = decl.and_then(|d| d.max_duration);
        let max_duration = match (declared, cap.map(|end| (end - placed.start).max(0.0))) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        audio.push(AudioTrackClip {
            clip_id: placed.clip_id.clone(),
            kind: placed.kind.into(),
            start: placed.start,
            source: artifacts.clip(&placed.clip_id).map(|(p, _)| p),
            volume: decl.map_or(1.0, |d| d.volume),
            max_duration,
            envelope: decl.map(|d| d.envelope.clone()).unwrap_or_default(),
        });
    };

    for item in &timeline.items {
        match item {
            ResolvedItem::Scene(s) => {
                for c in &s.clips {
                    push_clip(c, None);
                }
                for cue in &s.cues {
                    for c in &cue.clips {
                        push_clip(c, None);
                    }
                }
                scenes.push(SceneRecord {
                    id: s.id.clone(),
                    start: s.span.start,
                    end: s.span.end,
                    enter: s.enter.clone(),
                    exit: s.exit.clone(),
                    layers: s
                        .layers
                        .iter()
                        .map(|l| LayerRecord {
                            id: l.id.clone(),
                            start: l.span.start,
                            end: l.span.end,
                            components: l
                                .components
                                .iter()
                                .map(|c| ComponentRecord {
                                    id: c.id.clone(),
                                    component_type: c.component_type.clone(),
                                    start: c.span.start,
                                    end: c.span.end,
                                    props: c.props.clone(),
                                })
                                .collect(),
                        })
                        .collect(),
                });
            }
            ResolvedItem::Narration(n) => {
                for cue in &n.cues {
                    for c in &cue.clips {
                        push_clip(c, None);
                    }
                }
            }
            ResolvedItem::Transition(t) => {
                let cap = (t.overflow_audio == OverflowAudio::Clip).then_some(t.span.end);
                for c in &t.clips {
                    push_clip(c, cap);
                }
                transitions.push(TransitionRecord {
                    id: t.id.clone(),
                    effect: t.effect.clone(),
                    mode: t.applied_mode,
                    start: t.span.start,
                    end: t.span.end,
                });
            }
            ResolvedItem::Mark(m) => marks.push(MarkRecord {
                id: m.id.clone(),
                at: m.at,
            }),
        }
    }

    for item in &timeline.items {
        let cues = match item {
            ResolvedItem::Scene(s) => &s.cues,
            ResolvedItem::Narration(n) => &n.cues,
            _ => continue,
        };
        for cue in cues {
            for seg in &cue.segments {
                audio.push(AudioTrackClip {
                    clip_id: format!("{}#{}", cue.id, seg.index),
                    kind: UnitKind::Speech,
                    start: seg.span.start,
                    source: artifacts.segment(&cue.id, seg.index).map(|(p, _)| p),
                    volume: 1.0,
                    max_duration: None,
                    envelope: Vec::new(),
                });
            }
        }
    }

    audio.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then_with(|| a.clip_id.cmp(&b.clip_id))
    });

    CompiledTimeline {
        fps: timeline.fps,
        duration_sec: timeline.total_duration(),
        scenes,
        transitions,
        marks,
        audio,
    }
}

/// Lookup that knows no artifacts; every clip becomes a placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArtifacts;

impl ArtifactLookup for NoArtifacts {
    fn segment(&self, _cue_id: &str, _index: usize) -> Option<(String, f64)> {
        None
    }

    fn clip(&self, _clip_id: &str) -> Option<(String, f64)> {
        None
    }
}
