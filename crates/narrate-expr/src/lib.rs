#![forbid(unsafe_code)]
//! narrate-expr: the symbolic time-expression language.
//!
//! Expressions such as `scene(intro).end + 0.5s` or `prev.end - 10f` are
//! tokenized, parsed into an immutable [`Expr`] tree, and evaluated to seconds
//! against an [`EvalContext`] supplied by the resolver.
//!
//! **No I/O and no knowledge of timeline items** here. An evaluation that hits
//! a reference the context cannot answer yet returns
//! [`EvalError::Unresolved`]; the resolver treats that as "try again later".

pub mod ast;
pub mod error;
pub mod eval;
pub mod parser;
pub mod token;

pub use ast::{BinaryOp, Expr, UnaryOp, Unit};
pub use error::{EvalError, Reference, SyntaxError};
pub use eval::{evaluate, Edge, EvalContext, Slot};
pub use parser::parse;
