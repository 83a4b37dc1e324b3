//! Validation and expression pre-parse.
//!
//! Every expression is parsed exactly once, before any pass runs, so syntax
//! errors surface with a breadcrumb regardless of resolution order and the
//! resolver only ever evaluates trees.

use std::collections::HashSet;

use narrate_core::composition::{
    ClipDecl, Composition, CueItem, LayerDecl, SceneDecl, TimeExpr, TimelineItem,
};
use narrate_core::timeline::Breadcrumb;
use narrate_expr::{parse, Expr};

use crate::error::{CompileError, Result};

/// A composition that passed validation, with parsed expressions aligned to
/// the declarations index-for-index.
#[derive(Debug, Clone)]
pub struct PreparedComposition {
    pub doc: Composition,
    pub parsed: Vec<ParsedItem>,
}

impl PreparedComposition {
    pub fn len(&self) -> usize {
        self.doc.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ParsedItem {
    Scene(ParsedBlock),
    Narration(ParsedBlock),
    Transition(ParsedTransition),
    Mark { at: Expr },
}

/// Scene or narration block.
#[derive(Debug, Clone, Default)]
pub struct ParsedBlock {
    pub start: Option<Expr>,
    pub end: Option<Expr>,
    pub duration: Option<Expr>,
    pub cues: Vec<ParsedCue>,
    pub layers: Vec<ParsedLayer>,
    /// Offsets of clips attached to the block itself.
    pub clip_offsets: Vec<Option<Expr>>,
}

#[derive(Debug, Clone)]
pub enum ParsedCue {
    Pause(Expr),
    Cue {
        start: Option<Expr>,
        duration: Option<Expr>,
        clip_offsets: Vec<Option<Expr>>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ParsedLayer {
    pub start: Option<Expr>,
    pub end: Option<Expr>,
    pub components: Vec<(Option<Expr>, Option<Expr>)>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedTransition {
    pub start: Option<Expr>,
    pub end: Option<Expr>,
    pub duration: Option<Expr>,
    pub clip_offsets: Vec<Option<Expr>>,
}

/// Check ids and lengths, then parse every expression.
pub fn prepare(doc: Composition) -> Result<PreparedComposition> {
    check_ids(&doc)?;
    let mut parsed = Vec::with_capacity(doc.items.len());
    for item in &doc.items {
        let at = Breadcrumb::item(item.id());
        parsed.push(match item {
            TimelineItem::Scene(s) => {
                check_has_length(s.end.is_some() || s.duration.is_some(), &s.cues, &at)?;
                ParsedItem::Scene(parse_scene(s, &at)?)
            }
            TimelineItem::Narration(n) => {
                check_has_length(n.end.is_some() || n.duration.is_some(), &n.cues, &at)?;
                ParsedItem::Narration(ParsedBlock {
                    start: opt(&n.start, &at, "start")?,
                    end: opt(&n.end, &at, "end")?,
                    duration: opt(&n.duration, &at, "duration")?,
                    cues: parse_cues(&n.cues, &at)?,
                    ..Default::default()
                })
            }
            TimelineItem::Transition(t) => ParsedItem::Transition(ParsedTransition {
                start: opt(&t.start, &at, "start")?,
                end: opt(&t.end, &at, "end")?,
                duration: opt(&t.duration, &at, "duration")?,
                clip_offsets: offsets(&t.audio, &at)?,
            }),
            TimelineItem::Mark(m) => ParsedItem::Mark {
                at: one(&m.at, at.field("at"))?,
            },
        });
    }
    Ok(PreparedComposition { doc, parsed })
}

fn parse_scene(s: &SceneDecl, at: &Breadcrumb) -> Result<ParsedBlock> {
    Ok(ParsedBlock {
        start: opt(&s.start, at, "start")?,
        end: opt(&s.end, at, "end")?,
        duration: opt(&s.duration, at, "duration")?,
        cues: parse_cues(&s.cues, at)?,
        layers: s
            .layers
            .iter()
            .map(|l| parse_layer(l, at))
            .collect::<Result<_>>()?,
        clip_offsets: offsets(&s.audio, at)?,
    })
}

fn parse_cues(cues: &[CueItem], at: &Breadcrumb) -> Result<Vec<ParsedCue>> {
    cues.iter()
        .enumerate()
        .map(|(i, c)| match c {
            CueItem::Pause(p) => Ok(ParsedCue::Pause(one(
                &p.pause,
                at.clone().field(format!("cues[{i}].pause")),
            )?)),
            CueItem::Cue(c) => {
                let here = at.clone().cue(&c.id);
                Ok(ParsedCue::Cue {
                    start: opt(&c.start, &here, "start")?,
                    duration: opt(&c.duration, &here, "duration")?,
                    clip_offsets: offsets(&c.audio, &here)?,
                })
            }
        })
        .collect()
}

fn parse_layer(l: &LayerDecl, at: &Breadcrumb) -> Result<ParsedLayer> {
    let here = |field: &str| at.clone().field(format!("layers.{}.{field}", l.id));
    let mut components = Vec::with_capacity(l.components.len());
    for c in &l.components {
        let cf = |field: &str| {
            at.clone()
                .field(format!("layers.{}.{}.{field}", l.id, c.id))
        };
        components.push((
            c.start.as_ref().map(|e| one(e, cf("start"))).transpose()?,
            c.end.as_ref().map(|e| one(e, cf("end"))).transpose()?,
        ));
    }
    Ok(ParsedLayer {
        start: l.start.as_ref().map(|e| one(e, here("start"))).transpose()?,
        end: l.end.as_ref().map(|e| one(e, here("end"))).transpose()?,
        components,
    })
}

fn offsets(clips: &[ClipDecl], at: &Breadcrumb) -> Result<Vec<Option<Expr>>> {
    clips
        .iter()
        .map(|c| {
            c.offset
                .as_ref()
                .map(|e| one(e, at.clone().field(format!("audio.{}.offset", c.id))))
                .transpose()
        })
        .collect()
}

fn opt(e: &Option<TimeExpr>, at: &Breadcrumb, field: &str) -> Result<Option<Expr>> {
    e.as_ref()
        .map(|e| one(e, at.clone().field(field)))
        .transpose()
}

fn one(e: &TimeExpr, location: Breadcrumb) -> Result<Expr> {
    parse(e.as_str()).map_err(|source| CompileError::Syntax {
        location,
        text: e.as_str().to_string(),
        source,
    })
}

fn check_has_length(explicit: bool, cues: &[CueItem], at: &Breadcrumb) -> Result<()> {
    if explicit || !cues.is_empty() {
        Ok(())
    } else {
        Err(CompileError::MissingDuration {
            location: at.clone(),
        })
    }
}

fn check_ids(doc: &Composition) -> Result<()> {
    let mut items = HashSet::new();
    let mut cues = HashSet::new();
    let mut clips = HashSet::new();

    let dup = |what: &'static str, id: &str, location: Breadcrumb| CompileError::DuplicateId {
        what,
        id: id.to_string(),
        location,
    };

    for item in &doc.items {
        let id = item.id();
        if id.is_empty() {
            return Err(CompileError::invariant(
                Breadcrumb::default(),
                format!("{} with empty id", item.kind_name()),
            ));
        }
        if !items.insert(id) {
            return Err(dup("item", id, Breadcrumb::item(id)));
        }
        for clip in item.clips() {
            check_clip_id(&clip.id, || Breadcrumb::item(id))?;
            if !clips.insert(clip.id.as_str()) {
                return Err(dup("clip", &clip.id, Breadcrumb::item(id)));
            }
        }
        for cue in item.cues() {
            let CueItem::Cue(cue) = cue else { continue };
            let here = Breadcrumb::item(id).cue(&cue.id);
            if !cues.insert(cue.id.as_str()) {
                return Err(dup("cue", &cue.id, here));
            }
            for clip in &cue.audio {
                check_clip_id(&clip.id, || here.clone())?;
                if !clips.insert(clip.id.as_str()) {
                    return Err(dup("clip", &clip.id, here.clone()));
                }
            }
        }
    }
    Ok(())
}

/// Clip ids name directories in the artifact cache.
fn check_clip_id(id: &str, at: impl FnOnce() -> Breadcrumb) -> Result<()> {
    if id.is_empty() || id == "." || id.contains(['/', '\\']) || id.contains("..") {
        return Err(CompileError::invariant(
            at().field("audio"),
            format!("clip id '{id}' is not usable as a path component"),
        ));
    }
    Ok(())
}
