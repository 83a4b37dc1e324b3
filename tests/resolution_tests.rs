//! Planner behaviour over whole documents: expressions, resolution, shifts.

mod common;

use std::collections::HashMap;

use narrate_core::config::CompileConfig;
use narrate_core::timeline::{ResolvedItem, ResolvedTimeline};
use narrate_expr::{evaluate, parse, Edge, EvalContext, EvalError, Slot};
use narrate_planner::{
    apply_shifts, lower, parse_composition, plan, prepare, verify, CompileError,
    EstimatedDurations,
};

use common::{chain, INSERT, TOUR};

fn plan_str(src: &str) -> Result<ResolvedTimeline, CompileError> {
    let doc = parse_composition(src)?;
    let mut cfg = CompileConfig::default();
    cfg.apply_composition(&doc.config);
    let prepared = prepare(lower(doc))?;
    plan(&prepared, &cfg, &EstimatedDurations::default())
}

#[derive(Default)]
struct Scenes(HashMap<&'static str, (f64, f64)>);

impl EvalContext for Scenes {
    fn fps(&self) -> f64 {
        30.0
    }
    fn scene(&self, id: &str, edge: Edge) -> Slot<f64> {
        match self.0.get(id) {
            Some(&(s, _)) if edge == Edge::Start => Slot::Resolved(s),
            Some(&(_, e)) => Slot::Resolved(e),
            None => Slot::Missing,
        }
    }
    fn cue(&self, _id: &str, _edge: Edge) -> Slot<f64> {
        Slot::Missing
    }
    fn mark(&self, _id: &str) -> Slot<f64> {
        Slot::Missing
    }
    fn prev(&self, _edge: Edge) -> Slot<f64> {
        Slot::Missing
    }
    fn next(&self, _edge: Edge) -> Slot<f64> {
        Slot::Missing
    }
}

fn eval(src: &str, ctx: &Scenes) -> Result<f64, EvalError> {
    evaluate(&parse(src).expect("parse"), ctx)
}

#[test]
fn units_convert_to_seconds() {
    let ctx = Scenes::default();
    assert!((eval("30f", &ctx).unwrap() - 1.0).abs() < 1e-9);
    assert!((eval("500ms", &ctx).unwrap() - 0.5).abs() < 1e-9);
    assert!((eval("snap(1.23, 0.5)", &ctx).unwrap() - 1.0).abs() < 1e-9);
    assert!((eval("1s + 15f - 250ms", &ctx).unwrap() - 1.25).abs() < 1e-9);
}

#[test]
fn scene_references_read_the_context() {
    let mut ctx = Scenes::default();
    ctx.0.insert("intro", (0.0, 4.0));
    assert!((eval("scene(intro).end + 0.5s", &ctx).unwrap() - 4.5).abs() < 1e-9);
    assert!((eval("scene(intro).end - scene(intro).start", &ctx).unwrap() - 4.0).abs() < 1e-9);
    assert!(eval("scene(missing).end", &ctx).is_err());
}

#[test]
fn scenes_never_overlap_without_an_overlap_transition() {
    let t = plan_str(&chain(12, 6)).unwrap();
    let scenes: Vec<_> = t.scenes().map(|(_, s)| s.span).collect();
    assert_eq!(scenes.len(), 12);
    for pair in scenes.windows(2) {
        assert!(pair[1].start + 1e-9 >= pair[0].start);
    }
    verify(&t).unwrap();
}

#[test]
fn overlap_transition_pulls_next_scene_back() {
    let t = plan_str(&chain(4, 10)).unwrap();
    let s2 = t.find("s2").unwrap().span();
    let s3 = t.find("s3").unwrap().span();
    let Some(ResolvedItem::Transition(tr)) = t.find("t2") else {
        panic!("missing transition");
    };
    assert!((tr.span.end - s2.end).abs() < 1e-9);
    assert!((s3.start - tr.span.start).abs() < 1e-9);
    assert!(s3.start < s2.end);
}

#[test]
fn shifting_a_shifted_timeline_changes_nothing() {
    let once = plan_str(INSERT).unwrap();
    let twice = apply_shifts(&once);
    assert_eq!(once, twice);

    let tour = plan_str(TOUR).unwrap();
    assert_eq!(apply_shifts(&tour), tour);
}

#[test]
fn later_items_may_reference_earlier_ones_and_vice_versa() {
    let src = r#"
items:
  - kind: mark
    id: m
    at: "scene(b).start + 10f"
  - kind: scene
    id: a
    duration: 2s
  - kind: scene
    id: b
    start: "scene(a).end + 0.5s"
    duration: 1s
"#;
    let t = plan_str(src).unwrap();
    assert!((t.find("b").unwrap().span().start - 2.5).abs() < 1e-9);
    assert!((t.find("m").unwrap().span().start - (2.5 + 1.0 / 3.0)).abs() < 1e-9);
}

#[test]
fn mutual_references_name_both_items() {
    let src = r#"
items:
  - kind: scene
    id: left
    start: "scene(right).start"
    duration: 1s
  - kind: scene
    id: right
    start: "scene(left).start"
    duration: 1s
"#;
    match plan_str(src).unwrap_err() {
        CompileError::NonConvergence { unresolved, .. } => {
            assert!(unresolved.contains(&"left".to_string()));
            assert!(unresolved.contains(&"right".to_string()));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn explicit_overlap_without_transition_is_rejected() {
    let src = r#"
items:
  - kind: scene
    id: a
    duration: 4s
  - kind: scene
    id: b
    start: 1s
    duration: 1s
"#;
    assert!(matches!(
        plan_str(src).unwrap_err(),
        CompileError::Invariant { .. }
    ));
}

#[test]
fn bad_expressions_carry_their_location() {
    let src = r#"
items:
  - kind: scene
    id: a
    duration: "2s +"
"#;
    match plan_str(src).unwrap_err() {
        CompileError::Syntax { location, .. } => {
            assert_eq!(location.item.as_deref(), Some("a"));
            assert_eq!(location.field.as_deref(), Some("duration"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn duplicate_ids_are_rejected() {
    let src = r#"
items:
  - { kind: scene, id: a, duration: 1s }
  - { kind: scene, id: a, duration: 1s }
"#;
    assert!(matches!(
        plan_str(src).unwrap_err(),
        CompileError::DuplicateId { .. }
    ));
}

#[test]
fn scene_hint_becomes_a_transition() {
    let src = r#"
items:
  - kind: scene
    id: a
    duration: 2s
    transition_to_next: { effect: wipe, duration: "15f", mode: insert }
  - kind: scene
    id: b
    duration: 2s
"#;
    let t = plan_str(src).unwrap();
    let transitions: Vec<_> = t
        .items
        .iter()
        .filter(|it| matches!(it, ResolvedItem::Transition(_)))
        .collect();
    assert_eq!(transitions.len(), 1);
    assert!((t.find("b").unwrap().span().start - 2.5).abs() < 1e-9);
}
