use std::fmt;

use thiserror::Error;

/// Malformed expression text. Always fatal to a compilation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at offset {offset}: {message} (found {found})")]
pub struct SyntaxError {
    /// Byte offset into the expression source.
    pub offset: usize,
    /// The offending character or token, rendered for humans.
    pub found: String,
    pub message: String,
}

impl SyntaxError {
    pub fn new(offset: usize, found: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            offset,
            found: found.into(),
            message: message.into(),
        }
    }
}

/// What an unresolved evaluation was waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Scene(String),
    Cue(String),
    Mark(String),
    Prev,
    Next,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Scene(id) => write!(f, "scene({id})"),
            Reference::Cue(id) => write!(f, "cue({id})"),
            Reference::Mark(id) => write!(f, "mark({id})"),
            Reference::Prev => f.write_str("prev"),
            Reference::Next => f.write_str("next"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The referenced item is not in the context yet. Control flow for the
    /// resolver, never surfaced to callers directly.
    #[error("unresolved reference: {0}")]
    Unresolved(Reference),

    /// Arity mismatch, unknown identifier/function, bad property, etc.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}
