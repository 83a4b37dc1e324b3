use narrate_core::timeline::Breadcrumb;
use narrate_expr::SyntaxError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Fatal compilation failure. Resolution never partially recovers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("composition document: {0}")]
    Dsl(String),

    #[error("{location}: cannot parse `{text}`: {source}")]
    Syntax {
        location: Breadcrumb,
        text: String,
        source: SyntaxError,
    },

    #[error("duplicate {what} id '{id}' ({location})")]
    DuplicateId {
        what: &'static str,
        id: String,
        location: Breadcrumb,
    },

    #[error("timeline did not converge after {passes} passes; unresolved: {}", .unresolved.join(", "))]
    NonConvergence {
        /// Ids of every item still pending, in declaration order.
        unresolved: Vec<String>,
        passes: usize,
    },

    #[error("{location}: {message}")]
    Evaluation {
        location: Breadcrumb,
        message: String,
    },

    #[error("{location}: invariant violated: {message}")]
    Invariant {
        location: Breadcrumb,
        message: String,
    },

    #[error("{location}: no cues, end, or duration to derive a length from")]
    MissingDuration { location: Breadcrumb },
}

impl CompileError {
    pub fn invariant(location: Breadcrumb, message: impl Into<String>) -> Self {
        CompileError::Invariant {
            location,
            message: message.into(),
        }
    }

    /// Where the failure happened, if it is tied to one place.
    pub fn location(&self) -> Option<&Breadcrumb> {
        match self {
            CompileError::Syntax { location, .. }
            | CompileError::DuplicateId { location, .. }
            | CompileError::Evaluation { location, .. }
            | CompileError::Invariant { location, .. }
            | CompileError::MissingDuration { location } => Some(location),
            CompileError::Dsl(_) | CompileError::NonConvergence { .. } => None,
        }
    }
}

impl From<serde_yaml::Error> for CompileError {
    fn from(e: serde_yaml::Error) -> Self {
        CompileError::Dsl(e.to_string())
    }
}
