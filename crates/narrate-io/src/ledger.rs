//! Usage ledger: one NDJSON row per provider call.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use narrate_core::manifest::{RunId, UnitKind};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub run_id: RunId,
    pub kind: UnitKind,
    pub provider: String,
    /// Manifest key of the unit the call was made for.
    pub unit_key: String,
    /// Billable amount, in `unit`s (characters, seconds, ...).
    pub quantity: f64,
    pub unit: String,
    pub estimated_cost: f64,
    pub at_ms: u64,
}

/// Where usage records go.
pub trait UsageSink: Send + Sync {
    fn record(&self, rec: &UsageRecord) -> Result<()>;
}

/// Append-only NDJSON file.
pub struct JsonlLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlLedger {
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back (tests, reporting).
    pub fn read_all(&self) -> Result<Vec<UsageRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }
}

impl UsageSink for JsonlLedger {
    fn record(&self, rec: &UsageRecord) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(f);
        let line = serde_json::to_string(rec)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UsageSink for MemoryLedger {
    fn record(&self, rec: &UsageRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rec.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(provider: &str) -> UsageRecord {
        UsageRecord {
            run_id: RunId::new(),
            kind: UnitKind::Speech,
            provider: provider.into(),
            unit_key: "abc-0".into(),
            quantity: 11.0,
            unit: "characters".into(),
            estimated_cost: 0.0,
            at_ms: 5,
        }
    }

    #[test]
    fn jsonl_appends_one_line_per_record() {
        let path = std::env::temp_dir().join(format!(
            "narrate-ledger-{}-{}/usage.jsonl",
            std::process::id(),
            narrate_core::now_ms()
        ));
        let ledger = JsonlLedger::to_path(&path);
        ledger.record(&rec("a")).unwrap();
        ledger.record(&rec("b")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        let back = ledger.read_all().unwrap();
        assert_eq!(back[1].provider, "b");

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn memory_ledger_keeps_order() {
        let ledger = MemoryLedger::new();
        ledger.record(&rec("a")).unwrap();
        ledger.record(&rec("b")).unwrap();
        let names: Vec<_> = ledger.records().into_iter().map(|r| r.provider).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
