//! Post-shift invariant checks.
//!
//! Run on the final timeline, after transitions are applied. These are cheap
//! linear scans; a violation is always a hard error.

use narrate_core::composition::TransitionMode;
use narrate_core::timeline::{Breadcrumb, ResolvedItem, ResolvedTimeline, Span};

use crate::error::{CompileError, Result};

const EPS: f64 = 1e-6;

/// Ordering, non-negativity and containment over the whole timeline.
pub fn verify(t: &ResolvedTimeline) -> Result<()> {
    verify_spans(t)?;
    verify_scene_order(t)?;
    verify_containment(t)
}

/// Every item starts at or after zero and does not end before it starts.
pub fn verify_spans(t: &ResolvedTimeline) -> Result<()> {
    for item in &t.items {
        let span = item.span();
        if span.start < -EPS {
            return Err(CompileError::invariant(
                Breadcrumb::item(item.id()),
                format!("starts at negative time {:.3}s", span.start),
            ));
        }
        if span.end + EPS < span.start {
            return Err(CompileError::invariant(
                Breadcrumb::item(item.id()),
                format!("ends at {:.3}s before it starts at {:.3}s", span.end, span.start),
            ));
        }
    }
    Ok(())
}

/// Successive scenes do not overlap, except where an overlap transition
/// between them says so (then the later scene starts no earlier than the
/// transition).
pub fn verify_scene_order(t: &ResolvedTimeline) -> Result<()> {
    let mut prev: Option<(usize, Span)> = None;
    for (i, item) in t.items.iter().enumerate() {
        let ResolvedItem::Scene(s) = item else {
            continue;
        };
        if let Some((j, prev_span)) = prev {
            let floor = t.items[j + 1..i]
                .iter()
                .filter_map(|it| match it {
                    ResolvedItem::Transition(tr)
                        if tr.applied_mode == Some(TransitionMode::Overlap) =>
                    {
                        Some(tr.span.start)
                    }
                    _ => None,
                })
                .fold(prev_span.end, f64::min);
            if s.span.start + EPS < floor {
                return Err(CompileError::invariant(
                    Breadcrumb::item(&s.id),
                    format!(
                        "starts at {:.3}s, before previous scene '{}' ends at {:.3}s",
                        s.span.start,
                        t.items[j].id(),
                        prev_span.end
                    ),
                ));
            }
        }
        prev = Some((i, s.span));
    }
    Ok(())
}

/// Children sit inside their parents. A scene with an explicit end must not
/// be overrun by its cues.
pub fn verify_containment(t: &ResolvedTimeline) -> Result<()> {
    for item in &t.items {
        let (id, span, cues) = match item {
            ResolvedItem::Scene(s) => {
                for l in &s.layers {
                    let at = Breadcrumb::item(&s.id).field(format!("layers.{}", l.id));
                    inside(&s.span, &l.span, || at.clone(), "layer")?;
                    for c in &l.components {
                        inside(&l.span, &c.span, || at.clone().field(c.id.clone()), "component")?;
                    }
                }
                (&s.id, s.span, &s.cues)
            }
            ResolvedItem::Narration(n) => (&n.id, n.span, &n.cues),
            _ => continue,
        };
        for cue in cues {
            let at = Breadcrumb::item(id).cue(&cue.id);
            if !span.contains(&cue.span) {
                return Err(CompileError::invariant(
                    at,
                    format!(
                        "content [{:.3}s, {:.3}s] exceeds its parent [{:.3}s, {:.3}s]",
                        cue.span.start, cue.span.end, span.start, span.end
                    ),
                ));
            }
            for seg in &cue.segments {
                inside(&cue.span, &seg.span, || at.clone().segment(seg.index), "segment")?;
            }
        }
    }
    Ok(())
}

fn inside(
    outer: &Span,
    inner: &Span,
    at: impl FnOnce() -> Breadcrumb,
    what: &str,
) -> Result<()> {
    if outer.contains(inner) {
        Ok(())
    } else {
        Err(CompileError::invariant(
            at(),
            format!(
                "{what} [{:.3}s, {:.3}s] falls outside [{:.3}s, {:.3}s]",
                inner.start, inner.end, outer.start, outer.end
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use narrate_core::composition::OverflowAudio;
    use narrate_core::timeline::{ResolvedCue, ResolvedScene, ResolvedTransition};

    use super::*;

    fn scene(id: &str, span: Span, cue: Option<Span>) -> ResolvedItem {
        ResolvedItem::Scene(ResolvedScene {
            id: id.into(),
            span,
            explicit_end: true,
            enter: None,
            exit: None,
            cues: cue
                .map(|c| ResolvedCue {
                    id: format!("{id}-cue"),
                    span: c,
                    segments: vec![],
                    clips: vec![],
                })
                .into_iter()
                .collect(),
            layers: vec![],
            clips: vec![],
        })
    }

    fn tl(items: Vec<ResolvedItem>) -> ResolvedTimeline {
        ResolvedTimeline { fps: 30.0, items }
    }

    #[test]
    fn accepts_ordered_contained_timeline() {
        let t = tl(vec![
            scene("a", Span::new(0.0, 4.0), Some(Span::new(0.0, 3.0))),
            scene("b", Span::new(4.0, 5.0), None),
        ]);
        verify(&t).unwrap();
    }

    #[test]
    fn rejects_overlapping_scenes_without_transition() {
        let t = tl(vec![
            scene("a", Span::new(0.0, 4.0), None),
            scene("b", Span::new(3.0, 5.0), None),
        ]);
        assert!(matches!(verify(&t), Err(CompileError::Invariant { .. })));
    }

    #[test]
    fn overlap_transition_permits_overlap() {
        let t = tl(vec![
            scene("a", Span::new(0.0, 4.0), None),
            ResolvedItem::Transition(ResolvedTransition {
                id: "t".into(),
                span: Span::new(3.5, 4.0),
                effect: None,
                declared_mode: None,
                declared_duration: Some(0.5),
                overflow_audio: OverflowAudio::Clip,
                audio_extent: 0.0,
                clips: vec![],
                applied_mode: Some(TransitionMode::Overlap),
            }),
            scene("b", Span::new(3.5, 5.0), None),
        ]);
        verify(&t).unwrap();
    }

    #[test]
    fn content_overrunning_explicit_end_is_rejected() {
        let t = tl(vec![scene(
            "a",
            Span::new(0.0, 2.0),
            Some(Span::new(0.0, 2.5)),
        )]);
        let err = verify(&t).unwrap_err();
        assert_eq!(err.location().and_then(|l| l.cue.as_deref()), Some("a-cue"));
    }

    #[test]
    fn negative_start_is_rejected() {
        let t = tl(vec![scene("a", Span::new(-1.0, 2.0), None)]);
        assert!(verify(&t).is_err());
    }
}
