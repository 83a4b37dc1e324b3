//! Synthesis scheduler: turn every unit of a planned timeline into audio,
//! reusing the content-addressed cache wherever possible.
//!
//! Per unit, in timeline order:
//! 1. key + occurrence → manifest key;
//! 2. current environment's manifest (unless `fresh`); an entry whose file
//!    is gone counts as a miss;
//! 3. fallback environments, read-only; a hit is copied into the current
//!    manifest;
//! 4. provider call(s) under the duration guard, artifacts written under the
//!    current environment, one usage record per call.
//!
//! Speech failures abort the run. Sfx/music failures degrade to a prior
//! variant of the same clip, else to a silent placeholder. The manifest is
//! flushed on every exit path, including errors and cancellation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use narrate_core::composition::{ClipKind, Composition};
use narrate_core::config::SynthConfig;
use narrate_core::hash::Hash256;
use narrate_core::manifest::{
    manifest_key, ArtifactRecord, CacheManifest, ManifestEntry, RunId, RunStats, UnitKind,
};
use narrate_core::timeline::ResolvedTimeline;
use narrate_io::layout;
use narrate_io::ledger::{UsageRecord, UsageSink};
use narrate_io::manifest_store::ManifestStore;
use narrate_io::selection::Selections;
use narrate_io::storage::Storage;
use narrate_planner::output::ArtifactLookup;

use crate::cancel::CancelToken;
use crate::error::{ExecError, Result};
use crate::guard::{trim_to_apply, DurationGuard, Verdict};
use crate::provider::{
    Artifact, ClipProvider, Pricing, ProviderError, ProviderRegistry, SpeechProvider,
};
use crate::silent::wav_duration;
use crate::timeout::call_with_timeout;
use crate::units::{collect_units, Fingerprints, SynthesisUnit, UnitSpec};

/// Where one unit's audio ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRef {
    /// Cache-root-relative path; `None` for a silent placeholder.
    pub path: Option<String>,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Artifacts {
    /// Keyed by `<cue>#<segment>`.
    pub segments: BTreeMap<String, ArtifactRef>,
    /// Keyed by clip id.
    pub clips: BTreeMap<String, ArtifactRef>,
}

impl Artifacts {
    pub fn segment(&self, cue_id: &str, index: usize) -> Option<&ArtifactRef> {
        self.segments.get(&segment_key(cue_id, index))
    }

    pub fn clip(&self, clip_id: &str) -> Option<&ArtifactRef> {
        self.clips.get(clip_id)
    }
}

fn segment_key(cue_id: &str, index: usize) -> String {
    format!("{cue_id}#{index}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisReport {
    pub manifest: CacheManifest,
    pub artifacts: Artifacts,
    /// At least one provider call succeeded during this run.
    pub did_synthesize_any: bool,
    pub stats: RunStats,
}

impl ArtifactLookup for SynthesisReport {
    fn segment(&self, cue_id: &str, index: usize) -> Option<(String, f64)> {
        let a = self.artifacts.segment(cue_id, index)?;
        Some((a.path.clone()?, a.duration_sec))
    }

    fn clip(&self, clip_id: &str) -> Option<(String, f64)> {
        let a = self.artifacts.clip(clip_id)?;
        Some((a.path.clone()?, a.duration_sec))
    }
}

pub struct Scheduler {
    cfg: SynthConfig,
    storage: Arc<dyn Storage>,
    store: ManifestStore,
    speech: Arc<dyn SpeechProvider>,
    sfx: Arc<dyn ClipProvider>,
    music: Arc<dyn ClipProvider>,
    ledger: Arc<dyn UsageSink>,
    cancel: CancelToken,
    run_id: RunId,
}

impl Scheduler {
    /// Resolve the configured providers once; unknown names fail here.
    pub fn new(
        cfg: SynthConfig,
        storage: Arc<dyn Storage>,
        registry: &ProviderRegistry,
        ledger: Arc<dyn UsageSink>,
    ) -> Result<Self> {
        let speech = registry.speech(&cfg.speech_provider)?;
        let sfx = registry.clip(ClipKind::Sfx, &cfg.sfx_provider)?;
        let music = registry.clip(ClipKind::Music, &cfg.music_provider)?;
        Ok(Self {
            store: ManifestStore::new(Arc::clone(&storage)),
            cfg,
            storage,
            speech,
            sfx,
            music,
            ledger,
            cancel: CancelToken::new(),
            run_id: RunId::new(),
        })
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_run_id(mut self, id: RunId) -> Self {
        self.run_id = id;
        self
    }

    pub fn config(&self) -> &SynthConfig {
        &self.cfg
    }

    pub fn fingerprints(&self) -> Fingerprints {
        Fingerprints {
            speech: self.speech.fingerprint(),
            sfx: self.sfx.fingerprint(),
            music: self.music.fingerprint(),
        }
    }

    /// Synthesize (or find) audio for every unit of `timeline`.
    ///
    /// `doc` must be the lowered composition the timeline was resolved from.
    pub fn synthesize_all(
        &self,
        doc: &Composition,
        timeline: &ResolvedTimeline,
    ) -> Result<SynthesisReport> {
        let env = self.cfg.environment.as_str();
        let manifest = if self.cfg.fresh {
            info!(env, "fresh run; previous manifest discarded");
            self.store.discard(env)?;
            CacheManifest::new(env)
        } else {
            self.store.load(env)?
        };
        let mut fallbacks = Vec::new();
        if !self.cfg.fresh {
            for fb in &self.cfg.fallback_environments {
                if let Some(m) = self.store.load_existing(fb)? {
                    fallbacks.push(m);
                }
            }
        }
        let selections = Selections::load(self.storage.as_ref(), env)?;
        let units = collect_units(doc, timeline, &self.fingerprints())?;
        debug!(env, units = units.len(), run = %self.run_id, "synthesis started");

        let mut run = Run {
            sched: self,
            manifest,
            fallbacks,
            selections,
            occurrences: HashMap::new(),
            artifacts: Artifacts::default(),
            stats: RunStats::default(),
        };
        let outcome = run.process_all(&units);
        let flushed = self.store.save(&run.manifest);
        outcome?;
        flushed?;

        info!(
            env,
            units = run.stats.units,
            hits = run.stats.cache_hits,
            fallback_hits = run.stats.fallback_hits,
            calls = run.stats.provider_calls,
            placeholders = run.stats.placeholders,
            "synthesis finished"
        );
        Ok(SynthesisReport {
            did_synthesize_any: run.stats.provider_calls > 0,
            manifest: run.manifest,
            artifacts: run.artifacts,
            stats: run.stats,
        })
    }

    fn timeout(&self) -> Option<Duration> {
        self.cfg.provider_timeout_ms.map(Duration::from_millis)
    }

    fn clip_provider(&self, kind: UnitKind) -> &Arc<dyn ClipProvider> {
        match kind {
            UnitKind::Music => &self.music,
            UnitKind::Speech | UnitKind::Sfx => &self.sfx,
        }
    }

    fn provider_name(&self, kind: UnitKind) -> &str {
        match kind {
            UnitKind::Speech => &self.cfg.speech_provider,
            UnitKind::Sfx => &self.cfg.sfx_provider,
            UnitKind::Music => &self.cfg.music_provider,
        }
    }
}

/// Mutable state of one `synthesize_all` call.
struct Run<'a> {
    sched: &'a Scheduler,
    manifest: CacheManifest,
    fallbacks: Vec<CacheManifest>,
    selections: Selections,
    occurrences: HashMap<Hash256, u32>,
    artifacts: Artifacts,
    stats: RunStats,
}

impl Run<'_> {
    fn process_all(&mut self, units: &[SynthesisUnit]) -> Result<()> {
        for unit in units {
            if self.sched.cancel.is_cancelled() {
                warn!(at = %unit.location, "cancelled; remaining units skipped");
                return Err(ExecError::Cancelled);
            }
            self.stats.units += 1;
            let occurrence = {
                let n = self.occurrences.entry(unit.key).or_insert(0);
                *n += 1;
                *n - 1
            };
            let mkey = manifest_key(&unit.key, occurrence);
            trace!(at = %unit.location, kind = %unit.kind, key = %mkey, "unit");

            let (cached, long_retry_used) = self.lookup(unit, &mkey);
            let entry = match cached {
                Some(entry) => entry,
                None => match self.synthesize(unit, occurrence, &mkey, long_retry_used)? {
                    Ok(entry) => entry,
                    Err(source) if unit.kind.is_required() => {
                        return Err(ExecError::Provider {
                            location: unit.location.clone(),
                            source,
                        });
                    }
                    Err(source) => {
                        self.degrade(unit, &source)?;
                        continue;
                    }
                },
            };
            self.place(unit, &entry);
        }
        Ok(())
    }

    /// Cache lookup. The flag reports that a hit was rejected as too long,
    /// which uses up the one unconditional resynthesis.
    fn lookup(&mut self, unit: &SynthesisUnit, mkey: &str) -> (Option<ManifestEntry>, bool) {
        if self.sched.cfg.fresh {
            return (None, false);
        }
        let guard = DurationGuard::for_kind(&self.sched.cfg, unit.kind);

        if let Some(entry) = self.manifest.get(mkey) {
            if !self.files_present(entry) {
                warn!(at = %unit.location, key = mkey, "cached artifact missing; resynthesizing");
            } else if too_long(&guard, entry) {
                warn!(at = %unit.location, key = mkey, "cached artifact has implausible duration; resynthesizing");
                self.stats.resyntheses += 1;
                return (None, true);
            } else {
                debug!(at = %unit.location, key = mkey, "cache hit");
                self.stats.cache_hits += 1;
                return (Some(entry.clone()), false);
            }
        }

        let found = self.fallbacks.iter().find_map(|fb| {
            fb.get(mkey)
                .filter(|e| self.files_present(e) && !too_long(&guard, e))
                .map(|e| (fb.environment.clone(), e.clone()))
        });
        if let Some((env, entry)) = found {
            info!(at = %unit.location, key = mkey, from = %env, "fallback cache hit");
            self.stats.fallback_hits += 1;
            self.manifest.insert(mkey.to_string(), entry.clone());
            return (Some(entry), false);
        }
        (None, false)
    }

    fn files_present(&self, entry: &ManifestEntry) -> bool {
        !entry.variants.is_empty()
            && entry
                .variants
                .iter()
                .all(|v| self.sched.storage.exists(&v.path))
    }

    /// Outer error: storage. Inner error: the provider (or the guard) gave up.
    fn synthesize(
        &mut self,
        unit: &SynthesisUnit,
        occurrence: u32,
        mkey: &str,
        long_retry_used: bool,
    ) -> Result<std::result::Result<ManifestEntry, ProviderError>> {
        let env = self.sched.cfg.environment.clone();
        let timeout = self.sched.timeout();

        let (artifacts, paths, applied_trim) = match &unit.spec {
            UnitSpec::Speech { request, trim_end } => {
                let provider = Arc::clone(&self.sched.speech);
                let pricing = provider.pricing();
                let quantity = request.text.chars().count() as f64;
                let call = || {
                    let p = Arc::clone(&provider);
                    let req = request.clone();
                    call_with_timeout(timeout, move || p.synthesize(&req))
                };
                let outcome = self.call_guarded(
                    unit,
                    mkey,
                    &pricing,
                    Some(quantity),
                    long_retry_used,
                    call,
                );
                let art = match outcome {
                    Ok(a) => a,
                    Err(e) => return Ok(Err(e)),
                };
                let trim = trim_to_apply(
                    *trim_end,
                    art.trailing_silence_sec,
                    self.sched.cfg.trim_margin_sec,
                );
                let path = layout::segment_path(&env, &unit.key, occurrence, &art.format);
                (vec![art], vec![path], trim)
            }
            UnitSpec::Clip {
                request, variants, ..
            } => {
                let provider = Arc::clone(self.sched.clip_provider(unit.kind));
                let pricing = provider.pricing();
                let mut arts = Vec::with_capacity(*variants);
                let mut paths = Vec::with_capacity(*variants);
                for variant in 0..*variants {
                    let call = || {
                        let p = Arc::clone(&provider);
                        let mut req = request.clone();
                        req.variant = variant;
                        call_with_timeout(timeout, move || p.generate(&req))
                    };
                    let outcome =
                        self.call_guarded(unit, mkey, &pricing, None, long_retry_used, call);
                    let art = match outcome {
                        Ok(a) => a,
                        Err(e) => return Ok(Err(e)),
                    };
                    paths.push(layout::clip_path(
                        &env,
                        unit.kind,
                        &request.clip_id,
                        &unit.key,
                        occurrence,
                        variant,
                        &art.format,
                    ));
                    // Written as we go so a later failure still leaves usable variants.
                    self.sched.storage.write(&paths[variant], &art.bytes)?;
                    arts.push(art);
                }
                (arts, paths, None)
            }
        };

        if let UnitSpec::Speech { .. } = unit.spec {
            self.sched.storage.write(&paths[0], &artifacts[0].bytes)?;
        }

        let first = &artifacts[0];
        let entry = ManifestEntry {
            kind: unit.kind,
            provider: self.sched.provider_name(unit.kind).to_string(),
            source: unit.source().to_string(),
            sample_rate: first.sample_rate,
            format: first.format.clone(),
            variants: artifacts
                .iter()
                .zip(&paths)
                .map(|(a, p)| ArtifactRecord {
                    path: p.clone(),
                    duration_sec: a.duration_sec,
                })
                .collect(),
            applied_trim_sec: applied_trim,
            created_ms: narrate_core::now_ms(),
        };
        info!(at = %unit.location, key = mkey, variants = entry.variants.len(), "synthesized");
        self.manifest.insert(mkey.to_string(), entry.clone());
        Ok(Ok(entry))
    }

    /// One provider call, repeated while the guard allows: once more for an
    /// implausibly long result, up to `max_short_retries` for a short one.
    fn call_guarded<F>(
        &mut self,
        unit: &SynthesisUnit,
        mkey: &str,
        pricing: &Pricing,
        quantity: Option<f64>,
        mut long_retry_used: bool,
        call: F,
    ) -> std::result::Result<Artifact, ProviderError>
    where
        F: Fn() -> std::result::Result<Artifact, ProviderError>,
    {
        let guard = DurationGuard::for_kind(&self.sched.cfg, unit.kind);
        let mut short_retries = 0;
        loop {
            let art = match call() {
                Ok(a) => a,
                Err(e) => {
                    self.stats.provider_failures += 1;
                    warn!(at = %unit.location, error = %e, "provider call failed");
                    return Err(e);
                }
            };
            self.stats.provider_calls += 1;
            self.record_usage(unit, mkey, pricing, quantity.unwrap_or(art.duration_sec));

            match guard.check(art.duration_sec) {
                Verdict::Plausible => return Ok(art),
                Verdict::TooLong if !long_retry_used => {
                    warn!(at = %unit.location, duration = art.duration_sec, "implausibly long; resynthesizing once");
                    long_retry_used = true;
                    self.stats.resyntheses += 1;
                }
                Verdict::TooShort if short_retries < guard.max_short_retries => {
                    warn!(at = %unit.location, duration = art.duration_sec, "implausibly short; retrying");
                    short_retries += 1;
                    self.stats.resyntheses += 1;
                }
                verdict => {
                    return Err(ProviderError::Corrupt(format!(
                        "{:?} duration {:.3}s after retries",
                        verdict, art.duration_sec
                    )));
                }
            }
        }
    }

    fn record_usage(&self, unit: &SynthesisUnit, mkey: &str, pricing: &Pricing, quantity: f64) {
        let rec = UsageRecord {
            run_id: self.sched.run_id,
            kind: unit.kind,
            provider: self.sched.provider_name(unit.kind).to_string(),
            unit_key: mkey.to_string(),
            quantity,
            unit: pricing.unit.clone(),
            estimated_cost: pricing.estimate(quantity),
            at_ms: narrate_core::now_ms(),
        };
        if let Err(e) = self.sched.ledger.record(&rec) {
            warn!(error = %e, "usage record dropped");
        }
    }

    fn pick_for(&self, clip_id: &str, declared: usize, available: usize) -> usize {
        let pick = self.selections.get(clip_id).unwrap_or(declared);
        if available > 0 && pick >= available {
            warn!(clip = clip_id, pick, available, "pick out of range; using last variant");
            return available - 1;
        }
        pick
    }

    fn place(&mut self, unit: &SynthesisUnit, entry: &ManifestEntry) {
        match &unit.spec {
            UnitSpec::Speech { request, .. } => {
                self.artifacts.segments.insert(
                    segment_key(&request.cue_id, request.segment),
                    ArtifactRef {
                        path: entry.variants.first().map(|v| v.path.clone()),
                        duration_sec: entry.effective_duration(0).unwrap_or(0.0),
                    },
                );
            }
            UnitSpec::Clip { request, pick, .. } => {
                let pick = self.pick_for(&request.clip_id, *pick, entry.variants.len());
                self.artifacts.clips.insert(
                    request.clip_id.clone(),
                    ArtifactRef {
                        path: entry.variants.get(pick).map(|v| v.path.clone()),
                        duration_sec: entry.effective_duration(pick).unwrap_or(0.0),
                    },
                );
            }
        }
    }

    /// Optional clip failed: reuse any earlier variant of the same clip,
    /// preferring the picked one, else leave a silent placeholder.
    fn degrade(&mut self, unit: &SynthesisUnit, error: &ProviderError) -> Result<()> {
        let UnitSpec::Clip { request, pick, .. } = &unit.spec else {
            return Err(ExecError::Invariant(format!(
                "required unit at {} cannot degrade",
                unit.location
            )));
        };
        warn!(at = %unit.location, %error, "optional audio failed; degrading");

        let envs = std::iter::once(self.sched.cfg.environment.as_str())
            .chain(self.sched.cfg.fallback_environments.iter().map(String::as_str));
        let mut candidates = Vec::new();
        for env in envs {
            let prefix = layout::clip_prefix(env, unit.kind, &request.clip_id);
            candidates.extend(self.sched.storage.list(&prefix)?);
        }
        let pick = self.pick_for(&request.clip_id, *pick, usize::MAX);
        let chosen = candidates
            .iter()
            .find(|p| layout::variant_of(p) == Some(pick))
            .or_else(|| candidates.first())
            .cloned();

        let hint = request.duration_hint.unwrap_or(0.0);
        let artifact = match chosen {
            Some(path) => {
                let duration_sec = self
                    .sched
                    .storage
                    .read(&path)
                    .ok()
                    .and_then(|b| wav_duration(&b))
                    .unwrap_or(hint);
                info!(at = %unit.location, %path, "reusing earlier variant");
                ArtifactRef {
                    path: Some(path),
                    duration_sec,
                }
            }
            None => {
                warn!(at = %unit.location, duration = hint, "no earlier variant; silent placeholder");
                self.stats.placeholders += 1;
                ArtifactRef {
                    path: None,
                    duration_sec: hint,
                }
            }
        };
        self.artifacts.clips.insert(request.clip_id.clone(), artifact);
        Ok(())
    }
}

fn too_long(guard: &DurationGuard, entry: &ManifestEntry) -> bool {
    entry
        .variants
        .iter()
        .any(|v| guard.check(v.duration_sec) == Verdict::TooLong)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use narrate_core::config::CompileConfig;
    use narrate_io::ledger::MemoryLedger;
    use narrate_io::memory_storage::MemoryStorage;
    use narrate_planner::{lower, parse_composition, plan, prepare, EstimatedDurations};

    use super::*;
    use crate::provider::{ClipRequest, SpeechRequest};
    use crate::silent::wav_silence;

    type Step = std::result::Result<f64, ProviderError>;

    struct Scripted {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
        trailing: Option<f64>,
        cancel_on_call: Option<CancelToken>,
    }

    impl Scripted {
        fn new(script: Vec<Step>, fallback: Step) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
                fallback,
                trailing: None,
                cancel_on_call: None,
            }
        }

        fn ok(d: f64) -> Self {
            Self::new(vec![], Ok(d))
        }

        fn failing() -> Self {
            Self::new(vec![], Err(ProviderError::Unavailable("down".into())))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> std::result::Result<Artifact, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(t) = &self.cancel_on_call {
                t.cancel();
            }
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            step.map(|d| Artifact {
                bytes: wav_silence(d, 1_000),
                duration_sec: d,
                trailing_silence_sec: self.trailing,
                sample_rate: 1_000,
                format: "wav".into(),
            })
        }
    }

    impl SpeechProvider for Scripted {
        fn fingerprint(&self) -> String {
            "scripted".into()
        }

        fn pricing(&self) -> Pricing {
            Pricing {
                unit: "characters".into(),
                per_unit: 0.5,
            }
        }

        fn synthesize(&self, _req: &SpeechRequest) -> std::result::Result<Artifact, ProviderError> {
            self.next()
        }
    }

    impl ClipProvider for Scripted {
        fn fingerprint(&self) -> String {
            "scripted".into()
        }

        fn pricing(&self) -> Pricing {
            Pricing::free("seconds")
        }

        fn generate(&self, _req: &ClipRequest) -> std::result::Result<Artifact, ProviderError> {
            self.next()
        }
    }

    const DOC: &str = r#"
items:
  - kind: scene
    id: a
    cues:
      - { id: hello, text: "hello there" }
    audio:
      - { id: boom, kind: sfx, prompt: "boom", duration: 0.5, variants: 2 }
  - kind: scene
    id: b
    cues:
      - { id: bye, text: "goodbye now" }
"#;

    const ONE_CUE: &str = r#"
items:
  - kind: scene
    id: a
    cues:
      - id: hello
        segments: [ { text: "hello there", trim_end: 0.2 } ]
"#;

    fn planned(src: &str) -> (Composition, ResolvedTimeline) {
        let prepared = prepare(lower(parse_composition(src).unwrap())).unwrap();
        let t = plan(
            &prepared,
            &CompileConfig::default(),
            &EstimatedDurations::default(),
        )
        .unwrap();
        (prepared.doc, t)
    }

    struct Harness {
        storage: MemoryStorage,
        speech: Arc<Scripted>,
        clips: Arc<Scripted>,
        ledger: Arc<MemoryLedger>,
        cfg: SynthConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                storage: MemoryStorage::new(),
                speech: Arc::new(Scripted::ok(1.0)),
                clips: Arc::new(Scripted::ok(0.5)),
                ledger: Arc::new(MemoryLedger::new()),
                cfg: SynthConfig {
                    speech_provider: "test".into(),
                    sfx_provider: "test".into(),
                    music_provider: "test".into(),
                    ..SynthConfig::default()
                },
            }
        }

        fn scheduler(&self) -> Scheduler {
            let mut reg = ProviderRegistry::empty();
            reg.register_speech("test", self.speech.clone());
            reg.register_clip("test", self.clips.clone());
            Scheduler::new(
                self.cfg.clone(),
                Arc::new(self.storage.clone()),
                &reg,
                self.ledger.clone(),
            )
            .unwrap()
        }

        fn run(&self, src: &str) -> Result<SynthesisReport> {
            let (doc, t) = planned(src);
            self.scheduler().synthesize_all(&doc, &t)
        }
    }

    #[test]
    fn second_run_is_all_cache_hits() {
        let h = Harness::new();
        let first = h.run(DOC).unwrap();
        assert!(first.did_synthesize_any);
        assert_eq!(h.speech.calls(), 2);
        assert_eq!(h.clips.calls(), 2);
        assert_eq!(first.manifest.len(), 3);
        assert_eq!(h.ledger.records().len(), 4);
        assert_eq!(h.ledger.records()[0].estimated_cost, 5.5);
        assert!(h.storage.exists("dev/manifest.json"));

        let second = h.run(DOC).unwrap();
        assert!(!second.did_synthesize_any);
        assert_eq!(h.speech.calls(), 2);
        assert_eq!(h.clips.calls(), 2);
        assert_eq!(second.stats.cache_hits, 3);
        assert_eq!(second.manifest, first.manifest);
        assert_eq!(second.artifacts, first.artifacts);
    }

    #[test]
    fn identical_content_gets_one_artifact_per_occurrence() {
        const TWICE: &str = r#"
items:
  - kind: scene
    id: a
    cues:
      - { id: first, text: "same words here" }
      - { id: second, text: "same words here" }
"#;
        let h = Harness::new();
        let first = h.run(TWICE).unwrap();
        assert_eq!(h.speech.calls(), 2);
        assert_eq!(first.manifest.len(), 2);

        let p0 = first.artifacts.segment("first", 0).unwrap().path.clone().unwrap();
        let p1 = first.artifacts.segment("second", 0).unwrap().path.clone().unwrap();
        assert_ne!(p0, p1);
        assert!(p0.ends_with("-0.wav"), "{p0}");
        assert!(p1.ends_with("-1.wav"), "{p1}");
        assert_eq!(p0.trim_end_matches("-0.wav"), p1.trim_end_matches("-1.wav"));

        let second = h.run(TWICE).unwrap();
        assert_eq!(h.speech.calls(), 2);
        assert_eq!(second.stats.cache_hits, 2);
        assert_eq!(second.manifest, first.manifest);
    }

    #[test]
    fn missing_artifact_is_resynthesized() {
        let h = Harness::new();
        let first = h.run(DOC).unwrap();
        let path = first.artifacts.segment("hello", 0).unwrap().path.clone().unwrap();
        h.storage.delete(&path).unwrap();

        let second = h.run(DOC).unwrap();
        assert_eq!(h.speech.calls(), 3);
        assert_eq!(second.stats.cache_hits, 2);
        assert!(h.storage.exists(&path));
    }

    #[test]
    fn fallback_environment_is_probed_and_copied() {
        let mut h = Harness::new();
        h.cfg.environment = "prod".into();
        h.run(DOC).unwrap();

        h.cfg.environment = "dev".into();
        h.cfg.fallback_environments = vec!["prod".into()];
        let report = h.run(DOC).unwrap();
        assert_eq!(h.speech.calls(), 2);
        assert_eq!(report.stats.fallback_hits, 3);
        assert_eq!(report.manifest.environment, "dev");
        assert_eq!(report.manifest.len(), 3);
        assert!(h.storage.exists("dev/manifest.json"));
        assert!(report
            .artifacts
            .clip("boom")
            .unwrap()
            .path
            .as_deref()
            .unwrap()
            .starts_with("prod/sfx/boom/"));
    }

    #[test]
    fn fresh_ignores_the_cache() {
        let mut h = Harness::new();
        h.run(DOC).unwrap();
        h.cfg.fresh = true;
        let report = h.run(DOC).unwrap();
        assert_eq!(h.speech.calls(), 4);
        assert_eq!(report.stats.cache_hits, 0);
    }

    #[test]
    fn speech_failure_is_fatal_with_breadcrumb() {
        let mut h = Harness::new();
        h.speech = Arc::new(Scripted::failing());
        match h.run(DOC) {
            Err(ExecError::Provider { location, source }) => {
                assert_eq!(location.item.as_deref(), Some("a"));
                assert_eq!(location.cue.as_deref(), Some("hello"));
                assert_eq!(location.segment, Some(0));
                assert!(matches!(source, ProviderError::Unavailable(_)));
            }
            other => panic!("unexpected {:?}", other.map(|r| r.stats)),
        }
    }

    #[test]
    fn clip_failure_degrades_to_placeholder_or_prior_variant() {
        let mut h = Harness::new();
        h.clips = Arc::new(Scripted::failing());
        let report = h.run(DOC).unwrap();
        let boom = report.artifacts.clip("boom").unwrap();
        assert_eq!(boom.path, None);
        assert_eq!(boom.duration_sec, 0.5);
        assert_eq!(report.stats.placeholders, 1);
        assert_eq!(report.manifest.len(), 2);

        // Earlier variants of the same clip survive a prompt change.
        h.clips = Arc::new(Scripted::ok(0.5));
        h.run(DOC).unwrap();
        h.clips = Arc::new(Scripted::failing());
        let report = h.run(&DOC.replace("prompt: \"boom\"", "prompt: \"bang\"")).unwrap();
        let boom = report.artifacts.clip("boom").unwrap();
        assert!(boom.path.as_deref().unwrap().ends_with("-v0.wav"));
        assert_eq!(boom.duration_sec, 0.5);
        assert_eq!(report.stats.placeholders, 0);
    }

    #[test]
    fn long_output_is_resynthesized_once() {
        let mut h = Harness::new();
        h.speech = Arc::new(Scripted::new(vec![Ok(500.0)], Ok(2.0)));
        let report = h.run(ONE_CUE).unwrap();
        assert_eq!(h.speech.calls(), 2);
        assert_eq!(report.stats.resyntheses, 1);

        h.cfg.fresh = true;
        h.speech = Arc::new(Scripted::ok(500.0));
        assert!(matches!(
            h.run(ONE_CUE),
            Err(ExecError::Provider {
                source: ProviderError::Corrupt(_),
                ..
            })
        ));
        assert_eq!(h.speech.calls(), 2);
    }

    #[test]
    fn short_output_is_retried_within_bounds() {
        let mut h = Harness::new();
        h.speech = Arc::new(Scripted::new(vec![Ok(0.0), Ok(0.0)], Ok(1.0)));
        h.run(ONE_CUE).unwrap();
        assert_eq!(h.speech.calls(), 3);

        h.cfg.fresh = true;
        h.speech = Arc::new(Scripted::ok(0.0));
        assert!(h.run(ONE_CUE).is_err());
        assert_eq!(h.speech.calls(), 3);
    }

    #[test]
    fn trim_is_recorded_when_silence_allows() {
        let mut h = Harness::new();
        let mut speech = Scripted::ok(1.0);
        speech.trailing = Some(0.5);
        h.speech = Arc::new(speech);
        let report = h.run(ONE_CUE).unwrap();
        let entry = report.manifest.entries.values().next().unwrap();
        assert_eq!(entry.applied_trim_sec, Some(0.2));
        assert_eq!(report.artifacts.segment("hello", 0).unwrap().duration_sec, 0.8);
    }

    #[test]
    fn selections_choose_among_variants() {
        let h = Harness::new();
        h.storage
            .write("dev/selections.json", br#"{"boom": 1}"#)
            .unwrap();
        let report = h.run(DOC).unwrap();
        let path = report.artifacts.clip("boom").unwrap().path.clone().unwrap();
        assert!(path.ends_with("-v1.wav"));

        // Changing only the pick is still a cache hit; out-of-range clamps.
        h.storage
            .write("dev/selections.json", br#"{"boom": 7}"#)
            .unwrap();
        let again = h.run(DOC).unwrap();
        assert_eq!(h.clips.calls(), 2);
        assert_eq!(again.artifacts.clip("boom").unwrap().path.as_deref(), Some(path.as_str()));
    }

    #[test]
    fn cancellation_flushes_what_was_produced() {
        let mut h = Harness::new();
        let token = CancelToken::new();
        let mut speech = Scripted::ok(1.0);
        speech.cancel_on_call = Some(token.clone());
        h.speech = Arc::new(speech);

        let (doc, t) = planned(DOC);
        let err = h
            .scheduler()
            .with_cancel(token)
            .synthesize_all(&doc, &t)
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert_eq!(h.speech.calls(), 1);

        let saved = ManifestStore::new(Arc::new(h.storage.clone()))
            .load("dev")
            .unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn unknown_provider_fails_at_construction() {
        let mut h = Harness::new();
        h.cfg.music_provider = "nope".into();
        let err = Scheduler::new(
            h.cfg.clone(),
            Arc::new(h.storage.clone()),
            &ProviderRegistry::new(),
            h.ledger.clone(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ExecError::UnknownProvider { .. }));
    }
}
