#![forbid(unsafe_code)]
//! narrate-exec: synthesis scheduling, the artifact cache, and compilation.
//!
//! The scheduler walks a planned timeline unit by unit, consulting the
//! per-environment manifest before calling a provider. The [`Compiler`] wires
//! that between a plan pass (estimated durations) and a final pass (measured
//! durations), then emits the hand-off timeline and a [`RunRecord`].
//!
//! [`RunRecord`]: narrate_core::manifest::RunRecord

pub mod cancel;
pub mod compiler;
pub mod error;
pub mod guard;
pub mod measured;
pub mod provider;
pub mod replay;
pub mod scheduler;
pub mod silent;
pub mod timeout;
pub mod units;

pub use cancel::CancelToken;
pub use compiler::{Compilation, Compiler};
pub use error::{ExecError, Result};
pub use measured::MeasuredDurations;
pub use provider::{
    Artifact, ClipProvider, ClipRequest, Pricing, ProviderError, ProviderRegistry, SpeechProvider,
    SpeechRequest,
};
pub use scheduler::{ArtifactRef, Artifacts, Scheduler, SynthesisReport};
pub use silent::SilentProvider;
