//! Author-facing declarations.
//!
//! A [`Composition`] is an ordered list of [`TimelineItem`]s. Declaration order
//! is fixed at parse time and is the only total order available before
//! resolution. Times are symbolic [`TimeExpr`] strings evaluated later.

use serde::{Deserialize, Serialize};

/// Raw time-expression text, e.g. `scene(intro).end + 0.5s`.
///
/// Plain YAML numbers are accepted and read as seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawExpr", into = "String")]
pub struct TimeExpr(pub String);

impl TimeExpr {
    pub fn new(src: impl Into<String>) -> Self {
        TimeExpr(src.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<TimeExpr> for String {
    fn from(e: TimeExpr) -> Self {
        e.0
    }
}

impl From<&str> for TimeExpr {
    fn from(s: &str) -> Self {
        TimeExpr(s.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpr {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<RawExpr> for TimeExpr {
    fn from(raw: RawExpr) -> Self {
        match raw {
            RawExpr::Text(s) => TimeExpr(s),
            RawExpr::Int(i) => TimeExpr(i.to_string()),
            RawExpr::Float(f) => TimeExpr(f.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Per-composition overrides layered over [`crate::config::CompileConfig`].
    #[serde(default)]
    pub config: CompositionConfig,
    pub items: Vec<TimelineItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionConfig {
    pub fps: Option<f64>,
    pub words_per_minute: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    Scene(SceneDecl),
    Transition(TransitionDecl),
    Mark(MarkDecl),
    Narration(NarrationDecl),
}

impl TimelineItem {
    pub fn id(&self) -> &str {
        match self {
            TimelineItem::Scene(s) => &s.id,
            TimelineItem::Transition(t) => &t.id,
            TimelineItem::Mark(m) => &m.id,
            TimelineItem::Narration(n) => &n.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TimelineItem::Scene(_) => "scene",
            TimelineItem::Transition(_) => "transition",
            TimelineItem::Mark(_) => "mark",
            TimelineItem::Narration(_) => "narration",
        }
    }

    /// Cues declared directly on this item (scenes and narration only).
    pub fn cues(&self) -> &[CueItem] {
        match self {
            TimelineItem::Scene(s) => &s.cues,
            TimelineItem::Narration(n) => &n.cues,
            _ => &[],
        }
    }

    /// Clips attached to the item itself (not to its cues).
    pub fn clips(&self) -> &[ClipDecl] {
        match self {
            TimelineItem::Scene(s) => &s.audio,
            TimelineItem::Transition(t) => &t.audio,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDecl {
    pub id: String,
    pub start: Option<TimeExpr>,
    pub end: Option<TimeExpr>,
    pub duration: Option<TimeExpr>,
    pub enter: Option<String>,
    pub exit: Option<String>,
    /// Lowered into an explicit transition item before resolution.
    pub transition_to_next: Option<TransitionHint>,
    #[serde(default)]
    pub cues: Vec<CueItem>,
    #[serde(default)]
    pub layers: Vec<LayerDecl>,
    #[serde(default)]
    pub audio: Vec<ClipDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrationDecl {
    pub id: String,
    pub start: Option<TimeExpr>,
    pub end: Option<TimeExpr>,
    pub duration: Option<TimeExpr>,
    #[serde(default)]
    pub cues: Vec<CueItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionDecl {
    pub id: String,
    pub effect: Option<String>,
    pub mode: Option<TransitionMode>,
    #[serde(default)]
    pub overflow_audio: OverflowAudio,
    pub start: Option<TimeExpr>,
    pub end: Option<TimeExpr>,
    pub duration: Option<TimeExpr>,
    #[serde(default)]
    pub audio: Vec<ClipDecl>,
}

/// Shorthand on a scene for "transition into whatever scene follows".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionHint {
    pub effect: Option<String>,
    pub duration: Option<TimeExpr>,
    pub mode: Option<TransitionMode>,
    #[serde(default)]
    pub overflow_audio: OverflowAudio,
    #[serde(default)]
    pub audio: Vec<ClipDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDecl {
    pub id: String,
    pub at: TimeExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Neighbouring scenes overlap by the transition duration.
    Overlap,
    /// The transition occupies its own slot; later items shift right.
    Insert,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowAudio {
    /// Transition lengthens to fit its attached audio.
    Extend,
    #[default]
    Clip,
}

/// Entry in a scene's or narration block's ordered cue list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CueItem {
    Pause(PauseDecl),
    Cue(CueDecl),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PauseDecl {
    pub pause: TimeExpr,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CueDecl {
    pub id: String,
    /// Shorthand for a single segment.
    pub text: Option<String>,
    #[serde(default)]
    pub segments: Vec<SegmentDecl>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub start: Option<TimeExpr>,
    pub duration: Option<TimeExpr>,
    #[serde(default)]
    pub audio: Vec<ClipDecl>,
}

impl CueDecl {
    /// Effective segment list: explicit `segments`, else `text` as one segment.
    pub fn effective_segments(&self) -> Vec<SegmentDecl> {
        if !self.segments.is_empty() {
            return self.segments.clone();
        }
        match &self.text {
            Some(text) => vec![SegmentDecl {
                text: text.clone(),
                trim_end: None,
            }],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDecl {
    pub text: String,
    /// Seconds of trailing silence to trim, if the audio really has that much.
    pub trim_end: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerDecl {
    pub id: String,
    pub start: Option<TimeExpr>,
    pub end: Option<TimeExpr>,
    #[serde(default)]
    pub components: Vec<ComponentDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDecl {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub start: Option<TimeExpr>,
    pub end: Option<TimeExpr>,
    #[serde(default)]
    pub props: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Sfx,
    Music,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDecl {
    pub id: String,
    pub kind: ClipKind,
    pub prompt: String,
    #[serde(default = "default_variants")]
    pub variants: u32,
    #[serde(default)]
    pub pick: u32,
    /// Duration hint in seconds, passed to the provider.
    pub duration: Option<f64>,
    /// Placement relative to the owner's start.
    pub offset: Option<TimeExpr>,
    #[serde(default, rename = "loop")]
    pub looped: bool,
    #[serde(default)]
    pub instrumental: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
    pub max_duration: Option<f64>,
    #[serde(default)]
    pub envelope: Vec<EnvelopePoint>,
}

impl ClipDecl {
    pub fn new(id: impl Into<String>, kind: ClipKind, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            prompt: prompt.into(),
            variants: default_variants(),
            pick: 0,
            duration: None,
            offset: None,
            looped: false,
            instrumental: false,
            volume: default_volume(),
            max_duration: None,
            envelope: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePoint {
    /// Seconds from clip start.
    pub at: f64,
    pub gain: f64,
}

fn default_variants() -> u32 {
    1
}

fn default_volume() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_expressions_read_as_seconds() {
        let m: MarkDecl = serde_json::from_str(r#"{"id":"m","at":2.5}"#).unwrap();
        assert_eq!(m.at.as_str(), "2.5");
        let m: MarkDecl = serde_json::from_str(r#"{"id":"m","at":3}"#).unwrap();
        assert_eq!(m.at.as_str(), "3");
    }

    #[test]
    fn cue_items_are_untagged() {
        let items: Vec<CueItem> =
            serde_json::from_str(r#"[{"id":"a","text":"hi"},{"pause":"0.5s"}]"#).unwrap();
        assert!(matches!(&items[0], CueItem::Cue(c) if c.id == "a"));
        assert!(matches!(&items[1], CueItem::Pause(p) if p.pause.as_str() == "0.5s"));
    }

    #[test]
    fn text_shorthand_is_one_segment() {
        let cue = CueDecl {
            id: "c".into(),
            text: Some("Hello there.".into()),
            ..Default::default()
        };
        assert_eq!(cue.effective_segments().len(), 1);
    }

    #[test]
    fn clip_defaults() {
        let c: ClipDecl =
            serde_json::from_str(r#"{"id":"w","kind":"sfx","prompt":"whoosh"}"#).unwrap();
        assert_eq!(c.variants, 1);
        assert_eq!(c.pick, 0);
        assert_eq!(c.volume, 1.0);
        assert!(!c.looped);
    }
}
