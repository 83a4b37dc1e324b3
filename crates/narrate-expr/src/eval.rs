//! Pure evaluation of an [`Expr`] against a read-only context.

use serde::{Deserialize, Serialize};

use crate::ast::{BinaryOp, Expr, UnaryOp, Unit};
use crate::error::{EvalError, Reference};

/// Which end of a range a lookup asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Start,
    End,
}

/// Answer to a context lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot<T> {
    Resolved(T),
    /// Exists but has not been resolved yet.
    Pending,
    /// Does not exist at all.
    Missing,
}

/// Read-only view supplied by the resolver. Never mutated during evaluation.
///
/// Lookups are per edge so that an item can refer to its own start while its
/// end is still being computed.
pub trait EvalContext {
    fn fps(&self) -> f64;
    fn scene(&self, id: &str, edge: Edge) -> Slot<f64>;
    fn cue(&self, id: &str, edge: Edge) -> Slot<f64>;
    fn mark(&self, id: &str) -> Slot<f64>;
    /// Item immediately before the one being evaluated, by declaration order.
    fn prev(&self, edge: Edge) -> Slot<f64>;
    fn next(&self, edge: Edge) -> Slot<f64>;
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Scene(&'a str),
    Cue(&'a str),
    Mark(&'a str),
    Prev,
    Next,
    Timeline,
}

#[derive(Debug, Clone, Copy)]
enum Value<'a> {
    Scalar(f64),
    /// Something with a start and end; bare use means start.
    Ref(Target<'a>),
}

/// Evaluate to seconds.
pub fn evaluate(expr: &Expr, ctx: &dyn EvalContext) -> Result<f64, EvalError> {
    let v = scalar(eval(expr, ctx)?, ctx)?;
    finite(v)
}

fn eval<'a>(expr: &'a Expr, ctx: &dyn EvalContext) -> Result<Value<'a>, EvalError> {
    match expr {
        Expr::Number { value, unit } => Ok(Value::Scalar(convert(*value, *unit, ctx)?)),
        Expr::Ident(name) => match name.as_str() {
            "prev" => Ok(Value::Ref(Target::Prev)),
            "next" => Ok(Value::Ref(Target::Next)),
            "timeline" => Ok(Value::Ref(Target::Timeline)),
            other => Err(eval_err(format!("unknown identifier '{other}'"))),
        },
        Expr::Str(s) => Err(eval_err(format!(
            "string '{s}' is only valid as an id argument"
        ))),
        Expr::Unary { op, expr } => {
            let v = scalar(eval(expr, ctx)?, ctx)?;
            Ok(Value::Scalar(match op {
                UnaryOp::Plus => v,
                UnaryOp::Neg => -v,
            }))
        }
        Expr::Binary { op, lhs, rhs } => {
            let a = scalar(eval(lhs, ctx)?, ctx)?;
            let b = scalar(eval(rhs, ctx)?, ctx)?;
            let v = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(eval_err("division by zero"));
                    }
                    a / b
                }
            };
            Ok(Value::Scalar(finite(v)?))
        }
        Expr::Call { name, args } => call(name, args, ctx),
        Expr::Property { target, prop } => {
            let edge = match prop.as_str() {
                "start" => Edge::Start,
                "end" => Edge::End,
                other => return Err(eval_err(format!("unknown property '{other}'"))),
            };
            match eval(target, ctx)? {
                Value::Ref(t) => read(t, edge, ctx).map(Value::Scalar),
                Value::Scalar(_) => Err(eval_err(format!("'.{prop}' applied to a number"))),
            }
        }
    }
}

fn convert(value: f64, unit: Option<Unit>, ctx: &dyn EvalContext) -> Result<f64, EvalError> {
    match unit {
        None | Some(Unit::Seconds) => Ok(value),
        Some(Unit::Millis) => Ok(value / 1000.0),
        Some(Unit::Frames) => {
            let fps = ctx.fps();
            if fps <= 0.0 || !fps.is_finite() {
                return Err(eval_err(format!("invalid frame rate {fps}")));
            }
            Ok(value / fps)
        }
    }
}

fn call<'a>(name: &str, args: &'a [Expr], ctx: &dyn EvalContext) -> Result<Value<'a>, EvalError> {
    match name {
        "scene" => Ok(Value::Ref(Target::Scene(id_arg(name, args)?))),
        "cue" => Ok(Value::Ref(Target::Cue(id_arg(name, args)?))),
        "mark" => Ok(Value::Ref(Target::Mark(id_arg(name, args)?))),
        "min" | "max" => {
            if args.len() < 2 {
                return Err(eval_err(format!(
                    "{name}() takes at least 2 arguments, got {}",
                    args.len()
                )));
            }
            let mut acc = scalar(eval(&args[0], ctx)?, ctx)?;
            for a in &args[1..] {
                let v = scalar(eval(a, ctx)?, ctx)?;
                acc = if name == "min" { acc.min(v) } else { acc.max(v) };
            }
            Ok(Value::Scalar(acc))
        }
        "clamp" => {
            let [v, lo, hi] = numeric_args::<3>(name, args, ctx)?;
            if lo > hi {
                return Err(eval_err(format!("clamp() bounds inverted: {lo} > {hi}")));
            }
            Ok(Value::Scalar(v.clamp(lo, hi)))
        }
        "snap" => {
            let [v, grid] = numeric_args::<2>(name, args, ctx)?;
            if grid == 0.0 {
                return Ok(Value::Scalar(v));
            }
            Ok(Value::Scalar(finite((v / grid).round() * grid)?))
        }
        other => Err(eval_err(format!("unknown function '{other}'"))),
    }
}

fn read(target: Target<'_>, edge: Edge, ctx: &dyn EvalContext) -> Result<f64, EvalError> {
    match target {
        Target::Scene(id) => lookup(ctx.scene(id, edge), Reference::Scene(id.into()), || {
            format!("unknown scene '{id}'")
        }),
        Target::Cue(id) => lookup(ctx.cue(id, edge), Reference::Cue(id.into()), || {
            format!("unknown cue '{id}'")
        }),
        // A mark is an instant: start and end coincide.
        Target::Mark(id) => lookup(ctx.mark(id), Reference::Mark(id.into()), || {
            format!("unknown mark '{id}'")
        }),
        Target::Prev => lookup(ctx.prev(edge), Reference::Prev, || {
            "prev used on the first item".to_string()
        }),
        Target::Next => lookup(ctx.next(edge), Reference::Next, || {
            "next used on the last item".to_string()
        }),
        Target::Timeline => match edge {
            Edge::Start => Ok(0.0),
            Edge::End => Err(eval_err("timeline.end is not available")),
        },
    }
}

fn lookup<T>(
    slot: Slot<T>,
    reference: Reference,
    missing: impl FnOnce() -> String,
) -> Result<T, EvalError> {
    match slot {
        Slot::Resolved(v) => Ok(v),
        Slot::Pending => Err(EvalError::Unresolved(reference)),
        Slot::Missing => Err(eval_err(missing())),
    }
}

fn id_arg<'a>(name: &str, args: &'a [Expr]) -> Result<&'a str, EvalError> {
    match args {
        [one] => one
            .as_id()
            .ok_or_else(|| eval_err(format!("{name}() expects an id"))),
        _ => Err(eval_err(format!(
            "{name}() takes exactly 1 argument, got {}",
            args.len()
        ))),
    }
}

fn numeric_args<const N: usize>(
    name: &str,
    args: &[Expr],
    ctx: &dyn EvalContext,
) -> Result<[f64; N], EvalError> {
    if args.len() != N {
        return Err(eval_err(format!(
            "{name}() takes exactly {N} arguments, got {}",
            args.len()
        )));
    }
    let mut out = [0.0; N];
    for (slot, a) in out.iter_mut().zip(args) {
        *slot = scalar(eval(a, ctx)?, ctx)?;
    }
    Ok(out)
}

fn scalar(v: Value<'_>, ctx: &dyn EvalContext) -> Result<f64, EvalError> {
    match v {
        Value::Scalar(x) => Ok(x),
        Value::Ref(t @ (Target::Scene(_) | Target::Cue(_) | Target::Mark(_))) => {
            read(t, Edge::Start, ctx)
        }
        Value::Ref(t) => Err(eval_err(format!(
            "'{}' needs a property such as .start",
            match t {
                Target::Prev => "prev",
                Target::Next => "next",
                _ => "timeline",
            }
        ))),
    }
}

fn finite(v: f64) -> Result<f64, EvalError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(eval_err(format!("non-finite result {v}")))
    }
}

fn eval_err(msg: impl Into<String>) -> EvalError {
    EvalError::Evaluation(msg.into())
}
