//! End-to-end compilation: parse, plan, synthesize, re-plan, hand off.

use std::sync::Arc;

use tracing::{debug, info};

use narrate_core::now_ms;
use narrate_core::prelude::{CompileConfig, Composition, ResolvedTimeline, RunRecord};
use narrate_io::ledger::{JsonlLedger, MemoryLedger, UsageSink};
use narrate_io::storage::{build_storage, Storage};
use narrate_planner::{
    build_output, lower, parse_composition, plan, plan_provisional, prepare, CompiledTimeline,
    EstimatedDurations, PreparedComposition,
};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::measured::MeasuredDurations;
use crate::provider::ProviderRegistry;
use crate::replay::{hash_composition, hash_manifest, hash_timeline};
use crate::scheduler::{Scheduler, SynthesisReport};

/// Everything one compilation produced.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Final timeline, resolved against measured durations.
    pub timeline: ResolvedTimeline,
    pub output: CompiledTimeline,
    pub report: SynthesisReport,
    pub run: RunRecord,
}

/// Owns configuration, providers, storage and the ledger for compilations.
pub struct Compiler {
    config: CompileConfig,
    registry: ProviderRegistry,
    storage: Option<Arc<dyn Storage>>,
    ledger: Option<Arc<dyn UsageSink>>,
    cancel: CancelToken,
}

impl Compiler {
    pub fn new(config: CompileConfig) -> Self {
        Self {
            config,
            registry: ProviderRegistry::new(),
            storage: None,
            ledger: None,
            cancel: CancelToken::new(),
        }
    }

    /// Defaults overridden by `NARRATE_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(CompileConfig::from_env())
    }

    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use this storage instead of one built from `cache_root`.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use this sink instead of `ledger_path` (or the in-memory default).
    pub fn with_ledger(mut self, ledger: Arc<dyn UsageSink>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    pub fn compile_str(&self, yaml: &str) -> Result<Compilation> {
        self.compile(parse_composition(yaml)?)
    }

    /// Plan pass only, with estimated durations. No providers, no storage.
    /// Scene order and containment are not checked; they depend on audio.
    pub fn plan(&self, doc: Composition) -> Result<ResolvedTimeline> {
        let (cfg, prepared) = self.prepare(doc)?;
        let estimates = EstimatedDurations::new(cfg.words_per_minute, cfg.min_estimate_sec);
        Ok(plan_provisional(&prepared, &cfg, &estimates)?)
    }

    pub fn compile(&self, doc: Composition) -> Result<Compilation> {
        let started = now_ms();
        let composition_hash = hash_composition(&doc)?;
        let (cfg, prepared) = self.prepare(doc)?;
        let estimates = EstimatedDurations::new(cfg.words_per_minute, cfg.min_estimate_sec);

        let planned = plan_provisional(&prepared, &cfg, &estimates)?;
        debug!(
            items = planned.items.len(),
            duration = planned.total_duration(),
            "plan pass resolved"
        );

        let storage = match &self.storage {
            Some(s) => Arc::clone(s),
            None => build_storage(&cfg.cache_root)?,
        };
        let ledger: Arc<dyn UsageSink> = match (&self.ledger, &cfg.ledger_path) {
            (Some(l), _) => Arc::clone(l),
            (None, Some(path)) => Arc::new(JsonlLedger::to_path(path)),
            (None, None) => Arc::new(MemoryLedger::new()),
        };
        let run = RunRecord::new(composition_hash, &cfg.environment, started);
        let scheduler = Scheduler::new(cfg.synth_config(), storage, &self.registry, ledger)?
            .with_cancel(self.cancel.clone())
            .with_run_id(run.id);
        let report = scheduler.synthesize_all(&prepared.doc, &planned)?;

        let measured = MeasuredDurations::new(&report.artifacts, estimates);
        let timeline = plan(&prepared, &cfg, &measured)?;
        let output = build_output(&timeline, &prepared.doc, &report);

        let run = run.finish(
            now_ms(),
            hash_timeline(&timeline)?,
            hash_manifest(&report.manifest)?,
            report.stats,
        );
        info!(
            run = %run.id,
            env = %cfg.environment,
            duration = output.duration_sec,
            synthesized = report.did_synthesize_any,
            "compiled"
        );
        Ok(Compilation {
            timeline,
            output,
            report,
            run,
        })
    }

    /// Effective config for `doc`, and the validated, lowered composition.
    fn prepare(&self, doc: Composition) -> Result<(CompileConfig, PreparedComposition)> {
        let mut cfg = self.config.clone();
        cfg.apply_composition(&doc.config);
        cfg.validate()?;
        Ok((cfg, prepare(lower(doc))?))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileConfig::default())
    }
}
