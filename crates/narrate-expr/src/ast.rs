//! Expression tree produced by the parser.

use serde::{Deserialize, Serialize};

/// Unit suffix attached to a numeric literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// `f`: divided by the context frame rate.
    Frames,
    /// `s`: no conversion.
    Seconds,
    /// `ms`: divided by 1000.
    Millis,
}

impl Unit {
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Frames => "f",
            Unit::Seconds => "s",
            Unit::Millis => "ms",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number {
        value: f64,
        unit: Option<Unit>,
    },
    /// Bare identifier: `prev`, `next`, `timeline`, or an id passed to a call.
    Ident(String),
    /// Quoted id, for ids that are not valid identifiers (`'intro-2'`).
    Str(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Property {
        target: Box<Expr>,
        prop: String,
    },
}

impl Expr {
    /// Literal seconds, handy for building expressions programmatically.
    pub fn seconds(value: f64) -> Self {
        Expr::Number {
            value,
            unit: Some(Unit::Seconds),
        }
    }

    /// The raw id if this node can name an item (`intro` or `'intro-2'`).
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Expr::Ident(s) | Expr::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}
