use thiserror::Error;

use narrate_core::timeline::Breadcrumb;
use narrate_planner::CompileError;

use crate::provider::ProviderError;

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("provider failed at {location}: {source}")]
    Provider {
        location: Breadcrumb,
        #[source]
        source: ProviderError,
    },

    #[error("no {kind} provider registered as '{name}'")]
    UnknownProvider { kind: &'static str, name: String },

    #[error("io: {0}")]
    Io(#[from] narrate_io::Error),

    #[error("hashing error: {0}")]
    Hash(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl From<narrate_core::error::Error> for ExecError {
    fn from(e: narrate_core::error::Error) -> Self {
        match e {
            narrate_core::error::Error::Config(m) => ExecError::Config(m),
            narrate_core::error::Error::Hash(m) => ExecError::Hash(m),
            narrate_core::error::Error::Invariant(m) => ExecError::Invariant(m),
        }
    }
}
