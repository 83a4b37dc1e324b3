//! Fixed-point timeline resolution.
//!
//! Items are attempted in ascending declaration order, pass after pass. An
//! item whose expressions hit an unresolved reference stays pending; every
//! item resolved earlier (including earlier in the same pass) is visible to
//! the ones after it. A pass that resolves nothing means the remaining items
//! depend on each other or on something that never resolves.

use std::collections::HashMap;

use narrate_core::composition::{ClipDecl, CueItem, TimelineItem};
use narrate_core::timeline::{
    Breadcrumb, PlacedClip, ResolvedComponent, ResolvedCue, ResolvedItem, ResolvedLayer,
    ResolvedMark, ResolvedNarration, ResolvedScene, ResolvedSegment, ResolvedTimeline,
    ResolvedTransition, Span,
};
use narrate_expr::{evaluate, Edge, EvalContext, EvalError, Expr, Reference, Slot};
use tracing::{debug, trace};

use crate::durations::DurationSource;
use crate::error::{CompileError, Result};
use crate::prepare::{ParsedBlock, ParsedCue, ParsedItem, ParsedTransition, PreparedComposition};

const EPS: f64 = 1e-9;

/// Which timing invariants a resolution enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariants {
    /// All of them. Use with measured durations.
    Enforce,
    /// Skip checks whose outcome depends on content length. Estimated
    /// durations may overrun bounds that the real audio fits in.
    Defer,
}

/// Resolve every item to absolute seconds, enforcing scene order.
pub fn resolve(
    prepared: &PreparedComposition,
    fps: f64,
    durations: &dyn DurationSource,
) -> Result<ResolvedTimeline> {
    resolve_with(prepared, fps, durations, Invariants::Enforce)
}

pub fn resolve_with(
    prepared: &PreparedComposition,
    fps: f64,
    durations: &dyn DurationSource,
    invariants: Invariants,
) -> Result<ResolvedTimeline> {
    let r = Resolver::new(prepared, fps, durations);
    let n = r.items.len();
    let mut done: Vec<Option<ResolvedItem>> = vec![None; n];
    let mut pending: Vec<usize> = (0..n).collect();
    let max_passes = n + 2;
    let mut pass = 0;

    while !pending.is_empty() {
        pass += 1;
        if pass > max_passes {
            return Err(non_convergence(&r, &pending, pass - 1));
        }
        let mut still = Vec::new();
        for &i in &pending {
            match r.resolve_item(&done, i) {
                Ok(item) => done[i] = Some(item),
                Err(Attempt::Pending(waiting_on)) => {
                    trace!(pass, item = r.items[i].id(), %waiting_on, "deferred");
                    still.push(i);
                }
                Err(Attempt::Fatal(e)) => return Err(e),
            }
        }
        trace!(
            pass,
            resolved = pending.len() - still.len(),
            pending = still.len(),
            "resolver pass"
        );
        if still.len() == pending.len() {
            return Err(non_convergence(&r, &still, pass));
        }
        pending = still;
    }
    debug!(items = n, passes = pass, "timeline resolved");

    let items: Vec<ResolvedItem> = done.into_iter().flatten().collect();
    if items.len() != n {
        return Err(CompileError::invariant(
            Breadcrumb::default(),
            "resolver finished with unresolved items",
        ));
    }
    if invariants == Invariants::Enforce {
        check_scene_order(&r, &items)?;
    }
    Ok(ResolvedTimeline { fps, items })
}

fn non_convergence(r: &Resolver<'_>, pending: &[usize], passes: usize) -> CompileError {
    CompileError::NonConvergence {
        unresolved: pending
            .iter()
            .map(|&i| r.items[i].id().to_string())
            .collect(),
        passes,
    }
}

/// A scene with an explicit start may not begin before the previous scene ends.
fn check_scene_order(r: &Resolver<'_>, items: &[ResolvedItem]) -> Result<()> {
    for (i, item) in r.items.iter().enumerate() {
        let TimelineItem::Scene(decl) = item else {
            continue;
        };
        let (Some(_), Some(j)) = (&decl.start, r.prev_scene[i]) else {
            continue;
        };
        let start = items[i].span().start;
        let prev_end = items[j].span().end;
        if start + EPS < prev_end {
            return Err(CompileError::invariant(
                Breadcrumb::item(&decl.id).field("start"),
                format!(
                    "starts at {start:.3}s, before previous scene '{}' ends at {prev_end:.3}s",
                    items[j].id()
                ),
            ));
        }
    }
    Ok(())
}

enum Attempt {
    Pending(Reference),
    Fatal(CompileError),
}

impl From<CompileError> for Attempt {
    fn from(e: CompileError) -> Self {
        Attempt::Fatal(e)
    }
}

type Step<T> = std::result::Result<T, Attempt>;

struct Resolver<'a> {
    fps: f64,
    items: &'a [TimelineItem],
    parsed: &'a [ParsedItem],
    durations: &'a dyn DurationSource,
    ids: HashMap<&'a str, usize>,
    /// Cue id → index of the owning item.
    cue_owner: HashMap<&'a str, usize>,
    /// Nearest preceding scene for every index.
    prev_scene: Vec<Option<usize>>,
}

/// What is known about the item being resolved.
#[derive(Clone, Copy, Default)]
struct Own<'b> {
    start: Option<f64>,
    end: Option<f64>,
    cues: &'b [ResolvedCue],
    /// Cue currently being resolved and its start.
    cue: Option<(&'b str, f64)>,
}

struct Ctx<'b> {
    r: &'b Resolver<'b>,
    done: &'b [Option<ResolvedItem>],
    at: usize,
    own: Own<'b>,
}

impl<'a> Resolver<'a> {
    fn new(p: &'a PreparedComposition, fps: f64, durations: &'a dyn DurationSource) -> Self {
        let items = p.doc.items.as_slice();
        let mut ids = HashMap::new();
        let mut cue_owner = HashMap::new();
        let mut prev_scene = Vec::with_capacity(items.len());
        let mut last_scene = None;
        for (i, item) in items.iter().enumerate() {
            ids.insert(item.id(), i);
            for c in item.cues() {
                if let CueItem::Cue(c) = c {
                    cue_owner.insert(c.id.as_str(), i);
                }
            }
            prev_scene.push(last_scene);
            if matches!(item, TimelineItem::Scene(_)) {
                last_scene = Some(i);
            }
        }
        Self {
            fps,
            items,
            parsed: &p.parsed,
            durations,
            ids,
            cue_owner,
            prev_scene,
        }
    }

    fn ctx<'b>(&'b self, done: &'b [Option<ResolvedItem>], at: usize, own: Own<'b>) -> Ctx<'b>
    where
        'a: 'b,
    {
        Ctx {
            r: self,
            done,
            at,
            own,
        }
    }

    fn resolve_item(&self, done: &[Option<ResolvedItem>], at: usize) -> Step<ResolvedItem> {
        match (&self.items[at], &self.parsed[at]) {
            (TimelineItem::Scene(_), ParsedItem::Scene(p)) => self.scene(done, at, p),
            (TimelineItem::Narration(_), ParsedItem::Narration(p)) => {
                self.narration(done, at, p)
            }
            (TimelineItem::Transition(_), ParsedItem::Transition(p)) => {
                self.transition(done, at, p)
            }
            (TimelineItem::Mark(m), ParsedItem::Mark { at: expr }) => {
                let ctx = self.ctx(done, at, Own::default());
                let t = eval(expr, &ctx, || Breadcrumb::item(&m.id).field("at"))?;
                Ok(ResolvedItem::Mark(ResolvedMark {
                    id: m.id.clone(),
                    at: t,
                }))
            }
            _ => Err(self.mismatch(at)),
        }
    }

    fn mismatch(&self, at: usize) -> Attempt {
        Attempt::Fatal(CompileError::invariant(
            Breadcrumb::item(self.items[at].id()),
            "parsed form does not match declaration",
        ))
    }

    /// End of the nearest preceding scene, deferring while it is unresolved.
    fn prev_scene_end(&self, done: &[Option<ResolvedItem>], at: usize) -> Step<Option<f64>> {
        match self.prev_scene[at] {
            None => Ok(None),
            Some(j) => match &done[j] {
                Some(item) => Ok(Some(item.span().end)),
                None => Err(Attempt::Pending(Reference::Scene(
                    self.items[j].id().to_string(),
                ))),
            },
        }
    }

    fn scene(
        &self,
        done: &[Option<ResolvedItem>],
        at: usize,
        p: &ParsedBlock,
    ) -> Step<ResolvedItem> {
        let TimelineItem::Scene(decl) = &self.items[at] else {
            return Err(self.mismatch(at));
        };
        let loc = Breadcrumb::item(&decl.id);

        let start = match &p.start {
            Some(e) => {
                let ctx = self.ctx(done, at, Own::default());
                eval(e, &ctx, || loc.clone().field("start"))?
            }
            None => self.prev_scene_end(done, at)?.unwrap_or(0.0),
        };

        let (cues, content_end) = self.cues(done, at, start, &decl.cues, &p.cues, &loc)?;
        let end = self.block_end(done, at, start, &cues, content_end, p, &loc)?;

        let own = Own {
            start: Some(start),
            end: Some(end),
            cues: &cues,
            cue: None,
        };
        let ctx = self.ctx(done, at, own);
        let mut layers = Vec::with_capacity(decl.layers.len());
        for (l, pl) in decl.layers.iter().zip(&p.layers) {
            let field = |f: &str| loc.clone().field(format!("layers.{}.{f}", l.id));
            let ls = opt_eval(&pl.start, &ctx, || field("start"))?.unwrap_or(start);
            let le = opt_eval(&pl.end, &ctx, || field("end"))?.unwrap_or(end);
            let mut components = Vec::with_capacity(l.components.len());
            for (c, (cs, ce)) in l.components.iter().zip(&pl.components) {
                let cfield = |f: &str| loc.clone().field(format!("layers.{}.{}.{f}", l.id, c.id));
                components.push(ResolvedComponent {
                    id: c.id.clone(),
                    component_type: c.component_type.clone(),
                    span: Span::new(
                        opt_eval(cs, &ctx, || cfield("start"))?.unwrap_or(ls),
                        opt_eval(ce, &ctx, || cfield("end"))?.unwrap_or(le),
                    ),
                    props: c.props.clone(),
                });
            }
            layers.push(ResolvedLayer {
                id: l.id.clone(),
                span: Span::new(ls, le),
                components,
            });
        }
        let clips = self.place_clips(&decl.audio, &p.clip_offsets, start, &ctx, &loc)?;
        drop(ctx);

        Ok(ResolvedItem::Scene(ResolvedScene {
            id: decl.id.clone(),
            span: Span::new(start, end),
            explicit_end: decl.end.is_some() || decl.duration.is_some(),
            enter: decl.enter.clone(),
            exit: decl.exit.clone(),
            cues,
            layers,
            clips,
        }))
    }

    fn narration(
        &self,
        done: &[Option<ResolvedItem>],
        at: usize,
        p: &ParsedBlock,
    ) -> Step<ResolvedItem> {
        let TimelineItem::Narration(decl) = &self.items[at] else {
            return Err(self.mismatch(at));
        };
        let loc = Breadcrumb::item(&decl.id);
        let start = {
            let ctx = self.ctx(done, at, Own::default());
            opt_eval(&p.start, &ctx, || loc.clone().field("start"))?.unwrap_or(0.0)
        };
        let (cues, content_end) = self.cues(done, at, start, &decl.cues, &p.cues, &loc)?;
        let end = self.block_end(done, at, start, &cues, content_end, p, &loc)?;
        Ok(ResolvedItem::Narration(ResolvedNarration {
            id: decl.id.clone(),
            span: Span::new(start, end),
            cues,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn block_end(
        &self,
        done: &[Option<ResolvedItem>],
        at: usize,
        start: f64,
        cues: &[ResolvedCue],
        content_end: f64,
        p: &ParsedBlock,
        loc: &Breadcrumb,
    ) -> Step<f64> {
        let own = Own {
            start: Some(start),
            cues,
            ..Own::default()
        };
        let ctx = self.ctx(done, at, own);
        let end = if let Some(e) = &p.end {
            eval(e, &ctx, || loc.clone().field("end"))?
        } else if let Some(d) = &p.duration {
            start + eval(d, &ctx, || loc.clone().field("duration"))?
        } else {
            content_end
        };
        if end + EPS < start {
            return Err(CompileError::invariant(
                loc.clone().field("end"),
                format!("ends at {end:.3}s before it starts at {start:.3}s"),
            )
            .into());
        }
        Ok(end)
    }

    /// Lay cues out with a running cursor. Returns the cues and the furthest
    /// point any of them (or a trailing pause) reaches.
    fn cues(
        &self,
        done: &[Option<ResolvedItem>],
        at: usize,
        start: f64,
        decls: &[CueItem],
        parsed: &[ParsedCue],
        loc: &Breadcrumb,
    ) -> Step<(Vec<ResolvedCue>, f64)> {
        let mut out: Vec<ResolvedCue> = Vec::with_capacity(decls.len());
        let mut cursor = start;
        let mut furthest = start;

        for (i, (decl, p)) in decls.iter().zip(parsed).enumerate() {
            match (decl, p) {
                (CueItem::Pause(_), ParsedCue::Pause(e)) => {
                    let own = Own {
                        start: Some(start),
                        cues: &out,
                        ..Own::default()
                    };
                    let ctx = self.ctx(done, at, own);
                    let d = eval(e, &ctx, || loc.clone().field(format!("cues[{i}].pause")))?;
                    if d < 0.0 {
                        return Err(CompileError::invariant(
                            loc.clone().field(format!("cues[{i}].pause")),
                            format!("negative pause {d:.3}s"),
                        )
                        .into());
                    }
                    cursor += d;
                }
                (
                    CueItem::Cue(c),
                    ParsedCue::Cue {
                        start: cs,
                        duration: cd,
                        clip_offsets,
                    },
                ) => {
                    let here = loc.clone().cue(&c.id);
                    let own = Own {
                        start: Some(start),
                        cues: &out,
                        ..Own::default()
                    };
                    let cstart = {
                        let ctx = self.ctx(done, at, own);
                        opt_eval(cs, &ctx, || here.clone().field("start"))?.unwrap_or(cursor)
                    };

                    let mut segments = Vec::new();
                    let mut seg_cursor = cstart;
                    for (k, seg) in c.effective_segments().iter().enumerate() {
                        let d = self.durations.segment_duration(&c.id, k, seg).max(0.0);
                        segments.push(ResolvedSegment {
                            index: k,
                            span: Span::new(seg_cursor, seg_cursor + d),
                        });
                        seg_cursor += d;
                    }

                    let ctx = self.ctx(
                        done,
                        at,
                        Own {
                            cue: Some((c.id.as_str(), cstart)),
                            ..own
                        },
                    );
                    let dur = match cd {
                        Some(e) => eval(e, &ctx, || here.clone().field("duration"))?,
                        None => seg_cursor - cstart,
                    };
                    if dur < 0.0 {
                        return Err(CompileError::invariant(
                            here.field("duration"),
                            format!("negative duration {dur:.3}s"),
                        )
                        .into());
                    }
                    let clips = self.place_clips(&c.audio, clip_offsets, cstart, &ctx, &here)?;
                    drop(ctx);

                    cursor = cstart + dur;
                    furthest = furthest.max(cursor);
                    out.push(ResolvedCue {
                        id: c.id.clone(),
                        span: Span::new(cstart, cursor),
                        segments,
                        clips,
                    });
                }
                _ => {
                    return Err(CompileError::invariant(
                        loc.clone(),
                        "parsed cue list does not match declaration",
                    )
                    .into())
                }
            }
        }
        Ok((out, furthest.max(cursor)))
    }

    fn transition(
        &self,
        done: &[Option<ResolvedItem>],
        at: usize,
        p: &ParsedTransition,
    ) -> Step<ResolvedItem> {
        let TimelineItem::Transition(decl) = &self.items[at] else {
            return Err(self.mismatch(at));
        };
        let loc = Breadcrumb::item(&decl.id);

        let start = match &p.start {
            Some(e) => {
                let ctx = self.ctx(done, at, Own::default());
                eval(e, &ctx, || loc.clone().field("start"))?
            }
            None => self.prev_scene_end(done, at)?.unwrap_or(0.0),
        };
        let own = Own {
            start: Some(start),
            ..Own::default()
        };
        let ctx = self.ctx(done, at, own);
        let declared = if let Some(e) = &p.end {
            Some(eval(e, &ctx, || loc.clone().field("end"))? - start)
        } else {
            opt_eval(&p.duration, &ctx, || loc.clone().field("duration"))?
        };
        if let Some(d) = declared {
            if d < 0.0 {
                return Err(CompileError::invariant(
                    loc,
                    format!("negative transition duration {d:.3}s"),
                )
                .into());
            }
        }
        let clips = self.place_clips(&decl.audio, &p.clip_offsets, start, &ctx, &loc)?;
        let audio_extent = clips
            .iter()
            .map(|c| c.start - start + c.duration)
            .fold(0.0_f64, f64::max);

        Ok(ResolvedItem::Transition(ResolvedTransition {
            id: decl.id.clone(),
            span: Span::new(start, start + declared.unwrap_or(0.0)),
            effect: decl.effect.clone(),
            declared_mode: decl.mode,
            declared_duration: declared,
            overflow_audio: decl.overflow_audio,
            audio_extent,
            clips,
            applied_mode: None,
        }))
    }

    fn place_clips(
        &self,
        decls: &[ClipDecl],
        offsets: &[Option<Expr>],
        anchor: f64,
        ctx: &Ctx<'_>,
        loc: &Breadcrumb,
    ) -> Step<Vec<PlacedClip>> {
        let mut out = Vec::with_capacity(decls.len());
        for (clip, off) in decls.iter().zip(offsets) {
            let offset = opt_eval(off, ctx, || {
                loc.clone().field(format!("audio.{}.offset", clip.id))
            })?
            .unwrap_or(0.0);
            out.push(PlacedClip {
                clip_id: clip.id.clone(),
                kind: clip.kind,
                start: anchor + offset,
                duration: self.durations.clip_duration(clip).max(0.0),
            });
        }
        Ok(out)
    }
}

fn eval(expr: &Expr, ctx: &Ctx<'_>, loc: impl FnOnce() -> Breadcrumb) -> Step<f64> {
    evaluate(expr, ctx).map_err(|e| match e {
        EvalError::Unresolved(r) => Attempt::Pending(r),
        EvalError::Evaluation(message) => Attempt::Fatal(CompileError::Evaluation {
            location: loc(),
            message,
        }),
    })
}

fn opt_eval(
    expr: &Option<Expr>,
    ctx: &Ctx<'_>,
    loc: impl FnOnce() -> Breadcrumb,
) -> Step<Option<f64>> {
    expr.as_ref().map(|e| eval(e, ctx, loc)).transpose()
}

fn edge_of(span: Span, edge: Edge) -> f64 {
    match edge {
        Edge::Start => span.start,
        Edge::End => span.end,
    }
}

fn cues_of(item: &ResolvedItem) -> &[ResolvedCue] {
    match item {
        ResolvedItem::Scene(s) => &s.cues,
        ResolvedItem::Narration(n) => &n.cues,
        _ => &[],
    }
}

fn known(v: Option<f64>) -> Slot<f64> {
    v.map_or(Slot::Pending, Slot::Resolved)
}

impl Ctx<'_> {
    fn neighbour(&self, idx: Option<usize>, edge: Edge) -> Slot<f64> {
        match idx {
            None => Slot::Missing,
            Some(i) if i >= self.done.len() => Slot::Missing,
            Some(i) => match &self.done[i] {
                Some(item) => Slot::Resolved(edge_of(item.span(), edge)),
                None => Slot::Pending,
            },
        }
    }
}

impl EvalContext for Ctx<'_> {
    fn fps(&self) -> f64 {
        self.r.fps
    }

    fn scene(&self, id: &str, edge: Edge) -> Slot<f64> {
        let Some(&i) = self.r.ids.get(id) else {
            return Slot::Missing;
        };
        if !matches!(self.r.items[i], TimelineItem::Scene(_)) {
            return Slot::Missing;
        }
        if i == self.at {
            return match edge {
                Edge::Start => known(self.own.start),
                Edge::End => known(self.own.end),
            };
        }
        match &self.done[i] {
            Some(item) => Slot::Resolved(edge_of(item.span(), edge)),
            None => Slot::Pending,
        }
    }

    fn cue(&self, id: &str, edge: Edge) -> Slot<f64> {
        let Some(&owner) = self.r.cue_owner.get(id) else {
            return Slot::Missing;
        };
        if owner == self.at {
            if let Some(c) = self.own.cues.iter().find(|c| c.id == id) {
                return Slot::Resolved(edge_of(c.span, edge));
            }
            return match self.own.cue {
                Some((cur, start)) if cur == id && edge == Edge::Start => Slot::Resolved(start),
                _ => Slot::Pending,
            };
        }
        match &self.done[owner] {
            Some(item) => cues_of(item)
                .iter()
                .find(|c| c.id == id)
                .map_or(Slot::Missing, |c| Slot::Resolved(edge_of(c.span, edge))),
            None => Slot::Pending,
        }
    }

    fn mark(&self, id: &str) -> Slot<f64> {
        let Some(&i) = self.r.ids.get(id) else {
            return Slot::Missing;
        };
        if !matches!(self.r.items[i], TimelineItem::Mark(_)) {
            return Slot::Missing;
        }
        match &self.done[i] {
            Some(ResolvedItem::Mark(m)) => Slot::Resolved(m.at),
            _ => Slot::Pending,
        }
    }

    fn prev(&self, edge: Edge) -> Slot<f64> {
        self.neighbour(self.at.checked_sub(1), edge)
    }

    fn next(&self, edge: Edge) -> Slot<f64> {
        self.neighbour(Some(self.at + 1), edge)
    }
}
