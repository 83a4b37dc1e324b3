//! Resolved timing: every item with absolute seconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::composition::{ClipKind, OverflowAudio, TransitionMode};

/// Absolute `[start, end]` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

impl Span {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn instant(at: f64) -> Self {
        Self { start: at, end: at }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn shifted(&self, by: f64) -> Self {
        Self {
            start: self.start + by,
            end: self.end + by,
        }
    }

    /// Containment with a small tolerance for float noise.
    pub fn contains(&self, inner: &Span) -> bool {
        const EPS: f64 = 1e-9;
        inner.start + EPS >= self.start && inner.end <= self.end + EPS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTimeline {
    pub fps: f64,
    /// Same order and length as the declared items.
    pub items: Vec<ResolvedItem>,
}

impl ResolvedTimeline {
    pub fn scenes(&self) -> impl Iterator<Item = (usize, &ResolvedScene)> {
        self.items.iter().enumerate().filter_map(|(i, it)| match it {
            ResolvedItem::Scene(s) => Some((i, s)),
            _ => None,
        })
    }

    pub fn find(&self, id: &str) -> Option<&ResolvedItem> {
        self.items.iter().find(|it| it.id() == id)
    }

    /// Latest end over all items (0 for an empty timeline).
    pub fn total_duration(&self) -> f64 {
        self.items
            .iter()
            .map(|it| it.span().end)
            .fold(0.0_f64, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedItem {
    Scene(ResolvedScene),
    Transition(ResolvedTransition),
    Mark(ResolvedMark),
    Narration(ResolvedNarration),
}

impl ResolvedItem {
    pub fn id(&self) -> &str {
        match self {
            ResolvedItem::Scene(s) => &s.id,
            ResolvedItem::Transition(t) => &t.id,
            ResolvedItem::Mark(m) => &m.id,
            ResolvedItem::Narration(n) => &n.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ResolvedItem::Scene(s) => s.span,
            ResolvedItem::Transition(t) => t.span,
            ResolvedItem::Mark(m) => Span::instant(m.at),
            ResolvedItem::Narration(n) => n.span,
        }
    }

    /// Move the item and everything nested in it by `by` seconds.
    pub fn shift(&mut self, by: f64) {
        if by == 0.0 {
            return;
        }
        match self {
            ResolvedItem::Scene(s) => s.shift(by),
            ResolvedItem::Transition(t) => {
                t.span = t.span.shifted(by);
                shift_clips(&mut t.clips, by);
            }
            ResolvedItem::Mark(m) => m.at += by,
            ResolvedItem::Narration(n) => {
                n.span = n.span.shifted(by);
                for c in &mut n.cues {
                    c.shift(by);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedScene {
    pub id: String,
    pub span: Span,
    /// The author pinned the end; content must not run past it.
    pub explicit_end: bool,
    pub enter: Option<String>,
    pub exit: Option<String>,
    pub cues: Vec<ResolvedCue>,
    pub layers: Vec<ResolvedLayer>,
    pub clips: Vec<PlacedClip>,
}

impl ResolvedScene {
    pub fn shift(&mut self, by: f64) {
        self.span = self.span.shifted(by);
        for c in &mut self.cues {
            c.shift(by);
        }
        for l in &mut self.layers {
            l.span = l.span.shifted(by);
            for comp in &mut l.components {
                comp.span = comp.span.shifted(by);
            }
        }
        shift_clips(&mut self.clips, by);
    }

    /// Start moved, end kept: used when an overlap pulls the scene back.
    pub fn pull_start_to(&mut self, start: f64) {
        self.span.start = start;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNarration {
    pub id: String,
    pub span: Span,
    pub cues: Vec<ResolvedCue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCue {
    pub id: String,
    pub span: Span,
    pub segments: Vec<ResolvedSegment>,
    pub clips: Vec<PlacedClip>,
}

impl ResolvedCue {
    pub fn shift(&mut self, by: f64) {
        self.span = self.span.shifted(by);
        for s in &mut self.segments {
            s.span = s.span.shifted(by);
        }
        shift_clips(&mut self.clips, by);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSegment {
    pub index: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLayer {
    pub id: String,
    pub span: Span,
    pub components: Vec<ResolvedComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    pub id: String,
    pub component_type: String,
    pub span: Span,
    pub props: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTransition {
    pub id: String,
    pub span: Span,
    pub effect: Option<String>,
    pub declared_mode: Option<TransitionMode>,
    /// `end - start` for an explicit range, else the `duration` expression.
    pub declared_duration: Option<f64>,
    pub overflow_audio: OverflowAudio,
    /// Latest `offset + duration` over attached clips.
    pub audio_extent: f64,
    pub clips: Vec<PlacedClip>,
    /// Mode chosen by the shift propagator; `None` until shifts are applied.
    pub applied_mode: Option<TransitionMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMark {
    pub id: String,
    pub at: f64,
}

/// An attached audio clip with an absolute start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedClip {
    pub clip_id: String,
    pub kind: ClipKind,
    pub start: f64,
    pub duration: f64,
}

fn shift_clips(clips: &mut [PlacedClip], by: f64) {
    for c in clips {
        c.start += by;
    }
}

/// Location of a failure: item, then cue, then segment or field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub item: Option<String>,
    pub cue: Option<String>,
    pub segment: Option<usize>,
    pub field: Option<String>,
}

impl Breadcrumb {
    pub fn item(id: impl Into<String>) -> Self {
        Self {
            item: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn cue(mut self, id: impl Into<String>) -> Self {
        self.cue = Some(id.into());
        self
    }

    pub fn segment(mut self, index: usize) -> Self {
        self.segment = Some(index);
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.field = Some(name.into());
        self
    }
}

impl fmt::Display for Breadcrumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(i) = &self.item {
            parts.push(format!("item '{i}'"));
        }
        if let Some(c) = &self.cue {
            parts.push(format!("cue '{c}'"));
        }
        if let Some(s) = self.segment {
            parts.push(format!("segment {s}"));
        }
        if let Some(fld) = &self.field {
            parts.push(format!("field '{fld}'"));
        }
        if parts.is_empty() {
            f.write_str("<composition>")
        } else {
            f.write_str(&parts.join(" > "))
        }
    }
}
