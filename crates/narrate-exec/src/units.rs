//! Synthesis units and their cache keys.
//!
//! A key covers what a unit *sounds like* (text, voice, prompt, hints) plus
//! the provider fingerprint, never where it is placed. Moving a cue or
//! changing a clip's pick therefore never invalidates audio.

use std::collections::HashMap;

use serde::Serialize;

use narrate_core::composition::{ClipDecl, ClipKind, Composition, CueItem, TimelineItem};
use narrate_core::hash::{hash_with, Hash256};
use narrate_core::manifest::UnitKind;
use narrate_core::timeline::{Breadcrumb, ResolvedTimeline};

use crate::error::{ExecError, Result};
use crate::provider::{ClipRequest, SpeechRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisUnit {
    pub kind: UnitKind,
    pub key: Hash256,
    pub location: Breadcrumb,
    pub spec: UnitSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitSpec {
    Speech {
        request: SpeechRequest,
        trim_end: Option<f64>,
    },
    Clip {
        /// Template request; `variant` is filled in per call.
        request: ClipRequest,
        variants: usize,
        /// Declared pick; selections may override it.
        pick: usize,
    },
}

impl SynthesisUnit {
    /// Text or prompt, recorded in the manifest.
    pub fn source(&self) -> &str {
        match &self.spec {
            UnitSpec::Speech { request, .. } => &request.text,
            UnitSpec::Clip { request, .. } => &request.prompt,
        }
    }
}

/// Provider fingerprints folded into cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub speech: String,
    pub sfx: String,
    pub music: String,
}

#[derive(Serialize)]
struct SpeechKey<'a> {
    kind: &'static str,
    text: &'a str,
    voice: Option<&'a str>,
    instructions: Option<&'a str>,
    trim_end: Option<f64>,
}

#[derive(Serialize)]
struct ClipKey<'a> {
    kind: ClipKind,
    prompt: &'a str,
    variants: u32,
    duration: Option<f64>,
    looped: bool,
    instrumental: bool,
}

/// Every unit of the composition, in timeline order.
pub fn collect_units(
    doc: &Composition,
    timeline: &ResolvedTimeline,
    fingerprints: &Fingerprints,
) -> Result<Vec<SynthesisUnit>> {
    let decls: HashMap<&str, &TimelineItem> =
        doc.items.iter().map(|it| (it.id(), it)).collect();
    let mut units = Vec::new();

    for resolved in &timeline.items {
        let decl = decls.get(resolved.id()).ok_or_else(|| {
            ExecError::Invariant(format!(
                "timeline item '{}' has no declaration",
                resolved.id()
            ))
        })?;
        let owner = decl.id();

        for cue in decl.cues() {
            let CueItem::Cue(cue) = cue else { continue };
            for (index, seg) in cue.effective_segments().into_iter().enumerate() {
                let key = hash_with(
                    &SpeechKey {
                        kind: "speech",
                        text: &seg.text,
                        voice: cue.voice.as_deref(),
                        instructions: cue.instructions.as_deref(),
                        trim_end: seg.trim_end,
                    },
                    &[("provider", fingerprints.speech.as_str())],
                )?;
                units.push(SynthesisUnit {
                    kind: UnitKind::Speech,
                    key,
                    location: Breadcrumb::item(owner).cue(&cue.id).segment(index),
                    spec: UnitSpec::Speech {
                        request: SpeechRequest {
                            text: seg.text,
                            voice: cue.voice.clone(),
                            instructions: cue.instructions.clone(),
                            owner_id: owner.to_string(),
                            cue_id: cue.id.clone(),
                            segment: index,
                        },
                        trim_end: seg.trim_end,
                    },
                });
            }
            for clip in &cue.audio {
                let at = Breadcrumb::item(owner)
                    .cue(&cue.id)
                    .field(format!("audio.{}", clip.id));
                units.push(clip_unit(clip, at, fingerprints)?);
            }
        }

        for clip in decl.clips() {
            let at = Breadcrumb::item(owner).field(format!("audio.{}", clip.id));
            units.push(clip_unit(clip, at, fingerprints)?);
        }
    }
    Ok(units)
}

fn clip_unit(clip: &ClipDecl, location: Breadcrumb, fp: &Fingerprints) -> Result<SynthesisUnit> {
    let fingerprint = match clip.kind {
        ClipKind::Sfx => &fp.sfx,
        ClipKind::Music => &fp.music,
    };
    let key = hash_with(
        &ClipKey {
            kind: clip.kind,
            prompt: &clip.prompt,
            variants: clip.variants,
            duration: clip.duration,
            looped: clip.looped,
            instrumental: clip.instrumental,
        },
        &[("provider", fingerprint.as_str())],
    )?;
    Ok(SynthesisUnit {
        kind: clip.kind.into(),
        key,
        location,
        spec: UnitSpec::Clip {
            request: ClipRequest {
                clip_id: clip.id.clone(),
                kind: clip.kind,
                prompt: clip.prompt.clone(),
                duration_hint: clip.duration,
                looped: clip.looped,
                instrumental: clip.instrumental,
                variant: 0,
            },
            variants: clip.variants.max(1) as usize,
            pick: clip.pick as usize,
        },
    })
}

#[cfg(test)]
mod tests {
    use narrate_core::composition::{CueDecl, SceneDecl, SegmentDecl};
    use narrate_core::timeline::{ResolvedItem, ResolvedScene, Span};

    use super::*;

    fn fps() -> Fingerprints {
        Fingerprints {
            speech: "s1".into(),
            sfx: "x1".into(),
            music: "m1".into(),
        }
    }

    fn scene(id: &str, cues: Vec<CueItem>, audio: Vec<ClipDecl>) -> TimelineItem {
        TimelineItem::Scene(SceneDecl {
            id: id.into(),
            cues,
            audio,
            ..Default::default()
        })
    }

    fn cue(id: &str, text: &str) -> CueItem {
        CueItem::Cue(CueDecl {
            id: id.into(),
            text: Some(text.into()),
            ..Default::default()
        })
    }

    fn timeline_for(doc: &Composition) -> ResolvedTimeline {
        ResolvedTimeline {
            fps: 30.0,
            items: doc
                .items
                .iter()
                .map(|it| {
                    ResolvedItem::Scene(ResolvedScene {
                        id: it.id().into(),
                        span: Span::new(0.0, 1.0),
                        explicit_end: false,
                        enter: None,
                        exit: None,
                        cues: vec![],
                        layers: vec![],
                        clips: vec![],
                    })
                })
                .collect(),
        }
    }

    #[test]
    fn units_in_order_with_breadcrumbs() {
        let mut multi = CueDecl {
            id: "c2".into(),
            ..Default::default()
        };
        multi.segments = vec![
            SegmentDecl {
                text: "one".into(),
                trim_end: None,
            },
            SegmentDecl {
                text: "two".into(),
                trim_end: Some(0.1),
            },
        ];
        let doc = Composition {
            items: vec![
                scene("a", vec![cue("c1", "hello")], vec![ClipDecl::new("bed", ClipKind::Music, "calm")]),
                scene("b", vec![CueItem::Cue(multi)], vec![]),
            ],
            ..Default::default()
        };
        let units = collect_units(&doc, &timeline_for(&doc), &fps()).unwrap();
        let kinds: Vec<_> = units.iter().map(|u| u.kind).collect();
        assert_eq!(
            kinds,
            [UnitKind::Speech, UnitKind::Music, UnitKind::Speech, UnitKind::Speech]
        );
        assert_eq!(units[3].location.to_string(), "item 'b' > cue 'c2' > segment 1");
        assert_eq!(units[1].source(), "calm");
    }

    #[test]
    fn keys_ignore_placement_and_pick() {
        let doc_a = Composition {
            items: vec![scene("a", vec![cue("c1", "hello")], vec![])],
            ..Default::default()
        };
        let doc_b = Composition {
            items: vec![scene("zzz", vec![cue("other", "hello")], vec![])],
            ..Default::default()
        };
        let ka = collect_units(&doc_a, &timeline_for(&doc_a), &fps()).unwrap()[0].key;
        let kb = collect_units(&doc_b, &timeline_for(&doc_b), &fps()).unwrap()[0].key;
        assert_eq!(ka, kb);

        let mut picked = ClipDecl::new("x", ClipKind::Sfx, "boom");
        let k0 = clip_unit(&picked, Breadcrumb::default(), &fps()).unwrap().key;
        picked.pick = 2;
        assert_eq!(clip_unit(&picked, Breadcrumb::default(), &fps()).unwrap().key, k0);
        picked.prompt = "bang".into();
        assert_ne!(clip_unit(&picked, Breadcrumb::default(), &fps()).unwrap().key, k0);

        let mut other_provider = fps();
        other_provider.speech = "s2".into();
        let kc = collect_units(&doc_a, &timeline_for(&doc_a), &other_provider).unwrap()[0].key;
        assert_ne!(ka, kc);
    }
}
