//! Transition shift propagation.
//!
//! One left-to-right sweep. Each transition picks a duration and a mode:
//!
//! - **overlap**: the transition starts `d` before the preceding scene ends
//!   and the following scene is pulled back to that start. Nothing else moves.
//! - **insert**: the transition starts where the preceding scene ends and the
//!   following scene plus everything after it move right by however much the
//!   transition would otherwise run into it.
//!
//! Shifts are scheduled at the following scene's index and accumulate, so the
//! sweep is O(items). Applying the sweep to its own output changes nothing.

use narrate_core::composition::{OverflowAudio, TransitionMode};
use narrate_core::timeline::{ResolvedItem, ResolvedTimeline, ResolvedTransition};
use tracing::trace;

/// Transition length used when nothing else decides it.
pub const DEFAULT_TRANSITION_SEC: f64 = 1.0;

pub fn apply_shifts(timeline: &ResolvedTimeline) -> ResolvedTimeline {
    apply_shifts_with(timeline, DEFAULT_TRANSITION_SEC)
}

pub fn apply_shifts_with(timeline: &ResolvedTimeline, default_sec: f64) -> ResolvedTimeline {
    let mut out = timeline.clone();
    let n = out.items.len();

    // Neighbouring scenes by position, computed once.
    let mut prev_scene = vec![None; n];
    let mut next_scene = vec![None; n];
    let mut last = None;
    for (i, item) in out.items.iter().enumerate() {
        prev_scene[i] = last;
        if matches!(item, ResolvedItem::Scene(_)) {
            last = Some(i);
        }
    }
    let mut upcoming = None;
    for i in (0..n).rev() {
        next_scene[i] = upcoming;
        if matches!(out.items[i], ResolvedItem::Scene(_)) {
            upcoming = Some(i);
        }
    }

    let mut boost_at = vec![0.0_f64; n];
    let mut pull_to: Vec<Option<f64>> = vec![None; n];
    let mut cumulative = 0.0;

    for i in 0..n {
        cumulative += boost_at[i];
        out.items[i].shift(cumulative);

        if let (Some(start), ResolvedItem::Scene(s)) = (pull_to[i], &mut out.items[i]) {
            if s.span.start > start {
                s.pull_start_to(start);
            }
        }

        let prev_end = prev_scene[i].map(|j| out.items[j].span().end);
        // Where the following scene will land, counting shifts already owed to it.
        let next_start = next_scene[i]
            .map(|j| timeline.items[j].span().start + cumulative + boost_at[j]);

        let ResolvedItem::Transition(t) = &mut out.items[i] else {
            continue;
        };
        let d = duration_of(t, default_sec);
        let mode = t.declared_mode.unwrap_or(match (prev_end, next_start) {
            (Some(_), Some(_)) => TransitionMode::Overlap,
            _ => TransitionMode::Insert,
        });

        match mode {
            TransitionMode::Overlap => {
                let start = prev_end.map_or(t.span.start, |e| (e - d).max(0.0));
                place(t, start, d);
                if let Some(j) = next_scene[i] {
                    pull_to[j] = Some(pull_to[j].map_or(start, |p: f64| p.min(start)));
                }
            }
            TransitionMode::Insert => {
                let start = prev_end.unwrap_or(t.span.start);
                place(t, start, d);
                if let (Some(j), Some(next)) = (next_scene[i], next_start) {
                    let extra = (start + d - next).max(0.0);
                    boost_at[j] += extra;
                }
            }
        }
        t.applied_mode = Some(mode);
        trace!(transition = %t.id, ?mode, duration = d, start = t.span.start, "transition placed");
    }
    out
}

/// Explicit range or declared duration, else the attached audio when the
/// transition may grow to fit it, else the default.
fn duration_of(t: &ResolvedTransition, default_sec: f64) -> f64 {
    if let Some(d) = t.declared_duration {
        return d;
    }
    if t.overflow_audio == OverflowAudio::Extend && t.audio_extent > 0.0 {
        return t.audio_extent;
    }
    default_sec
}

fn place(t: &mut ResolvedTransition, start: f64, d: f64) {
    let delta = start - t.span.start;
    t.span.start = start;
    t.span.end = start + d;
    for c in &mut t.clips {
        c.start += delta;
    }
}
