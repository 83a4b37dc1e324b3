//! Provider seams: speech synthesis and sfx/music generation.
//!
//! Providers are trait objects looked up by name in a [`ProviderRegistry`]
//! once, when the scheduler is built. They must be `Send + Sync + 'static`
//! so a call can run on a worker thread under a timeout.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use narrate_core::composition::ClipKind;

use crate::error::{ExecError, Result};
use crate::silent::SilentProvider;

/// Audio produced by one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub duration_sec: f64,
    /// Measured silence at the end of the audio, when the provider knows it.
    pub trailing_silence_sec: Option<f64>,
    pub sample_rate: u32,
    /// File extension, e.g. `wav`.
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("implausible output: {0}")]
    Corrupt(String),
}

/// Cost model for usage records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// What a quantity counts (`characters`, `seconds`).
    pub unit: String,
    pub per_unit: f64,
}

impl Pricing {
    pub fn free(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            per_unit: 0.0,
        }
    }

    pub fn estimate(&self, quantity: f64) -> f64 {
        quantity * self.per_unit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    /// Where the segment sits; context only, never part of the cache key.
    pub owner_id: String,
    pub cue_id: String,
    pub segment: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipRequest {
    pub clip_id: String,
    pub kind: ClipKind,
    pub prompt: String,
    pub duration_hint: Option<f64>,
    pub looped: bool,
    pub instrumental: bool,
    pub variant: usize,
}

pub trait SpeechProvider: Send + Sync {
    /// Identifies the provider and anything that changes its output
    /// (model, voice defaults). Part of every cache key.
    fn fingerprint(&self) -> String;
    fn pricing(&self) -> Pricing;
    fn synthesize(&self, req: &SpeechRequest) -> std::result::Result<Artifact, ProviderError>;
}

pub trait ClipProvider: Send + Sync {
    fn fingerprint(&self) -> String;
    fn pricing(&self) -> Pricing;
    fn generate(&self, req: &ClipRequest) -> std::result::Result<Artifact, ProviderError>;
}

/// Providers by name.
#[derive(Clone)]
pub struct ProviderRegistry {
    speech: BTreeMap<String, Arc<dyn SpeechProvider>>,
    clips: BTreeMap<String, Arc<dyn ClipProvider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            speech: BTreeMap::new(),
            clips: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `silent` provider for both seams.
    pub fn new() -> Self {
        let mut reg = Self::empty();
        let silent = Arc::new(SilentProvider::default());
        reg.register_speech("silent", silent.clone());
        reg.register_clip("silent", silent);
        reg
    }

    pub fn register_speech(&mut self, name: impl Into<String>, p: Arc<dyn SpeechProvider>) {
        self.speech.insert(name.into(), p);
    }

    pub fn register_clip(&mut self, name: impl Into<String>, p: Arc<dyn ClipProvider>) {
        self.clips.insert(name.into(), p);
    }

    pub fn speech(&self, name: &str) -> Result<Arc<dyn SpeechProvider>> {
        self.speech
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::UnknownProvider {
                kind: "speech",
                name: name.to_string(),
            })
    }

    pub fn clip(&self, kind: ClipKind, name: &str) -> Result<Arc<dyn ClipProvider>> {
        self.clips
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::UnknownProvider {
                kind: match kind {
                    ClipKind::Sfx => "sfx",
                    ClipKind::Music => "music",
                },
                name: name.to_string(),
            })
    }

    pub fn speech_names(&self) -> impl Iterator<Item = &str> {
        self.speech.keys().map(String::as_str)
    }

    pub fn clip_names(&self) -> impl Iterator<Item = &str> {
        self.clips.keys().map(String::as_str)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
