//! Compile configuration that downstream crates can serialize/deserialize.
//!
//! Layering: [`CompileConfig::default`], then [`CompileConfig::from_env`],
//! then the composition's own `config:` block via
//! [`CompileConfig::apply_composition`]. The scheduler only ever sees the
//! [`SynthConfig`] snapshot, never ambient state.

use serde::{Deserialize, Serialize};

use crate::composition::CompositionConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Frame rate used for `f` suffixes.
    pub fps: f64,

    /// Speaking rate for duration estimates before audio exists.
    pub words_per_minute: f64,

    /// Lower bound on any estimated speech segment.
    pub min_estimate_sec: f64,

    /// Transition length when nothing else decides it.
    pub default_transition_sec: f64,

    /// Cache environment (e.g. `dev`, `prod`).
    pub environment: String,

    /// Environments probed read-only after a miss in `environment`.
    pub fallback_environments: Vec<String>,

    /// Discard the current environment's manifest before running.
    pub fresh: bool,

    /// Root directory of the artifact cache.
    pub cache_root: String,

    /// Provider names resolved through the registry.
    pub speech_provider: String,
    pub sfx_provider: String,
    pub music_provider: String,

    /// Corruption guard ceilings.
    pub speech_ceiling_sec: f64,
    pub clip_ceiling_sec: f64,
    pub min_duration_sec: f64,
    pub max_short_retries: u32,

    /// Trailing silence must exceed the trim hint by this much before trimming.
    pub trim_margin_sec: f64,

    /// Per-call provider timeout; `None` waits indefinitely.
    pub provider_timeout_ms: Option<u64>,

    /// NDJSON usage ledger; `None` keeps records in memory only.
    pub ledger_path: Option<String>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            words_per_minute: 150.0,
            min_estimate_sec: 0.25,
            default_transition_sec: 1.0,
            environment: "dev".to_string(),
            fallback_environments: Vec::new(),
            fresh: false,
            cache_root: ".narrate-cache".to_string(),
            speech_provider: "silent".to_string(),
            sfx_provider: "silent".to_string(),
            music_provider: "silent".to_string(),
            speech_ceiling_sec: 180.0,
            clip_ceiling_sec: 600.0,
            min_duration_sec: 0.01,
            max_short_retries: 2,
            trim_margin_sec: 0.05,
            provider_timeout_ms: None,
            ledger_path: None,
        }
    }
}

/// Snapshot of everything the synthesis scheduler needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    pub environment: String,
    pub fallback_environments: Vec<String>,
    pub fresh: bool,
    pub cache_root: String,
    pub speech_provider: String,
    pub sfx_provider: String,
    pub music_provider: String,
    pub speech_ceiling_sec: f64,
    pub clip_ceiling_sec: f64,
    pub min_duration_sec: f64,
    pub max_short_retries: u32,
    pub trim_margin_sec: f64,
    pub provider_timeout_ms: Option<u64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        CompileConfig::default().synth_config()
    }
}

impl CompileConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `NARRATE_FPS`, `NARRATE_WORDS_PER_MINUTE`
    /// - `NARRATE_ENV`: cache environment
    /// - `NARRATE_FALLBACK_ENVS`: comma-separated fallback environments
    /// - `NARRATE_FRESH`: `1`/`true` to discard the current manifest
    /// - `NARRATE_CACHE_ROOT`
    /// - `NARRATE_SPEECH_PROVIDER`, `NARRATE_SFX_PROVIDER`, `NARRATE_MUSIC_PROVIDER`
    /// - `NARRATE_PROVIDER_TIMEOUT_MS`
    /// - `NARRATE_LEDGER_PATH`
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`Self::from_env`] with an injectable lookup (used by tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = get("NARRATE_FPS").and_then(|s| s.parse::<f64>().ok()) {
            cfg.fps = v;
        }

        if let Some(v) = get("NARRATE_WORDS_PER_MINUTE").and_then(|s| s.parse::<f64>().ok()) {
            cfg.words_per_minute = v;
        }

        if let Some(s) = get("NARRATE_ENV") {
            cfg.environment = s;
        }

        if let Some(s) = get("NARRATE_FALLBACK_ENVS") {
            cfg.fallback_environments = s
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(s) = get("NARRATE_FRESH") {
            cfg.fresh = matches!(s.trim(), "1" | "true" | "yes");
        }

        if let Some(s) = get("NARRATE_CACHE_ROOT") {
            cfg.cache_root = s;
        }

        if let Some(s) = get("NARRATE_SPEECH_PROVIDER") {
            cfg.speech_provider = s;
        }

        if let Some(s) = get("NARRATE_SFX_PROVIDER") {
            cfg.sfx_provider = s;
        }

        if let Some(s) = get("NARRATE_MUSIC_PROVIDER") {
            cfg.music_provider = s;
        }

        if let Some(v) = get("NARRATE_PROVIDER_TIMEOUT_MS").and_then(|s| s.parse::<u64>().ok()) {
            cfg.provider_timeout_ms = Some(v);
        }

        if let Some(s) = get("NARRATE_LEDGER_PATH") {
            cfg.ledger_path = Some(s);
        }

        cfg
    }

    /// Layer a composition's own `config:` block on top.
    pub fn apply_composition(&mut self, overrides: &CompositionConfig) {
        if let Some(fps) = overrides.fps {
            self.fps = fps;
        }
        if let Some(wpm) = overrides.words_per_minute {
            self.words_per_minute = wpm;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(Error::Config(format!("fps must be positive, got {}", self.fps)));
        }
        if !(self.words_per_minute.is_finite() && self.words_per_minute > 0.0) {
            return Err(Error::Config(format!(
                "words_per_minute must be positive, got {}",
                self.words_per_minute
            )));
        }
        if self.environment.is_empty() {
            return Err(Error::Config("environment must not be empty".into()));
        }
        for env in std::iter::once(&self.environment).chain(&self.fallback_environments) {
            if env.is_empty() || env.contains(['/', '\\']) || env.contains("..") {
                return Err(Error::Config(format!(
                    "environment '{env}' is not usable as a directory name"
                )));
            }
        }
        if self.fallback_environments.contains(&self.environment) {
            return Err(Error::Config(format!(
                "environment '{}' listed as its own fallback",
                self.environment
            )));
        }
        if self.min_duration_sec >= self.speech_ceiling_sec.min(self.clip_ceiling_sec) {
            return Err(Error::Config(
                "min_duration_sec must be below the duration ceilings".into(),
            ));
        }
        Ok(())
    }

    /// Produce the scheduler's configuration snapshot.
    pub fn synth_config(&self) -> SynthConfig {
        SynthConfig {
            environment: self.environment.clone(),
            fallback_environments: self.fallback_environments.clone(),
            fresh: self.fresh,
            cache_root: self.cache_root.clone(),
            speech_provider: self.speech_provider.clone(),
            sfx_provider: self.sfx_provider.clone(),
            music_provider: self.music_provider.clone(),
            speech_ceiling_sec: self.speech_ceiling_sec,
            clip_ceiling_sec: self.clip_ceiling_sec,
            min_duration_sec: self.min_duration_sec,
            max_short_retries: self.max_short_retries,
            trim_margin_sec: self.trim_margin_sec,
            provider_timeout_ms: self.provider_timeout_ms,
        }
    }
}
