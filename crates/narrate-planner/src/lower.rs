//! Lowering of authoring shorthands into explicit timeline items.

use narrate_core::composition::{Composition, TimelineItem, TransitionDecl};
use tracing::trace;

/// Id given to the transition generated from `<scene>.transition_to_next`.
pub fn hint_transition_id(scene_id: &str) -> String {
    format!("{scene_id}-to-next")
}

/// Turn every scene's `transition_to_next` hint into a real `Transition` item
/// placed right after the scene.
///
/// The hint is dropped when the next item is already a transition or when no
/// scene follows. The returned composition carries no hints.
pub fn lower(mut doc: Composition) -> Composition {
    let items = std::mem::take(&mut doc.items);
    // Whether any scene follows position i, in one reverse sweep.
    let mut scene_after = vec![false; items.len()];
    let mut seen = false;
    for (i, item) in items.iter().enumerate().rev() {
        scene_after[i] = seen;
        seen |= matches!(item, TimelineItem::Scene(_));
    }

    let mut out = Vec::with_capacity(items.len());
    let mut iter = items.into_iter().enumerate().peekable();
    while let Some((i, mut item)) = iter.next() {
        let hint = match &mut item {
            TimelineItem::Scene(s) => s.transition_to_next.take().map(|h| (s.id.clone(), h)),
            _ => None,
        };
        out.push(item);

        let Some((scene_id, hint)) = hint else {
            continue;
        };
        let next_is_transition =
            matches!(iter.peek(), Some((_, TimelineItem::Transition(_))));
        if next_is_transition || !scene_after[i] {
            trace!(scene = %scene_id, "transition hint dropped");
            continue;
        }
        out.push(TimelineItem::Transition(TransitionDecl {
            id: hint_transition_id(&scene_id),
            effect: hint.effect,
            mode: hint.mode,
            overflow_audio: hint.overflow_audio,
            start: None,
            end: None,
            duration: hint.duration,
            audio: hint.audio,
        }));
    }
    doc.items = out;
    doc
}

#[cfg(test)]
mod tests {
    use narrate_core::composition::{MarkDecl, SceneDecl, TimeExpr, TransitionHint};

    use super::*;

    fn scene(id: &str, hint: bool) -> TimelineItem {
        TimelineItem::Scene(SceneDecl {
            id: id.into(),
            duration: Some(TimeExpr::new("2s")),
            transition_to_next: hint.then(|| TransitionHint {
                duration: Some(TimeExpr::new("12f")),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn hint_becomes_item_between_scenes() {
        let doc = lower(Composition {
            items: vec![scene("a", true), scene("b", false)],
            ..Default::default()
        });
        let ids: Vec<_> = doc.items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, ["a", "a-to-next", "b"]);
        assert!(matches!(&doc.items[0], TimelineItem::Scene(s) if s.transition_to_next.is_none()));
    }

    #[test]
    fn hint_dropped_without_following_scene_or_before_explicit_transition() {
        let doc = lower(Composition {
            items: vec![scene("a", true)],
            ..Default::default()
        });
        assert_eq!(doc.items.len(), 1);

        let doc = lower(Composition {
            items: vec![
                scene("a", true),
                TimelineItem::Transition(TransitionDecl {
                    id: "t".into(),
                    ..Default::default()
                }),
                scene("b", false),
            ],
            ..Default::default()
        });
        assert_eq!(doc.items.len(), 3);
    }

    #[test]
    fn hints_across_a_long_chain_and_trailing_marks() {
        let mut items: Vec<TimelineItem> =
            (0..2_000).map(|i| scene(&format!("s{i}"), true)).collect();
        items.insert(
            1,
            TimelineItem::Mark(MarkDecl {
                id: "m".into(),
                at: "0".into(),
            }),
        );
        let doc = lower(Composition {
            items,
            ..Default::default()
        });
        let transitions = doc
            .items
            .iter()
            .filter(|it| matches!(it, TimelineItem::Transition(_)))
            .count();
        assert_eq!(transitions, 1_999);
        assert_eq!(doc.items[1].id(), "s0-to-next");
        assert_eq!(doc.items.last().map(|i| i.id()), Some("s1999"));
    }
}
