//! Execution ledger: the append-only record of task outcomes.
//!
//! The ledger is the source of truth for resume. The orchestrator is its only
//! writer and writes exactly one batch per resolved phase. Entries are never
//! edited or removed by the engine; only a checkpoint restore may replace them.

mod file;

pub use file::FileLedger;

use crate::work_item::TaskNumber;
use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Recorded outcome of one task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Failed,
}

/// A decision a provider made while doing the work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub choice: String,
    pub rationale: String,
}

/// An issue a provider ran into and resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIssue {
    pub issue: String,
    pub resolution: String,
}

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub work_item: String,
    pub task: TaskNumber,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_deleted: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub issues_resolved: Vec<ResolvedIssue>,
    pub status: EntryStatus,
    /// Provider error detail for failed entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerEntry {
    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }

    pub fn has_file_changes(&self) -> bool {
        !(self.files_created.is_empty()
            && self.files_modified.is_empty()
            && self.files_deleted.is_empty())
    }
}

/// Durable store for ledger entries.
pub trait LedgerStore: Send + Sync {
    /// All entries for a work item, in write order.
    fn entries(&self, work_item: &str) -> Result<Vec<LedgerEntry>>;

    /// Append a whole phase's entries atomically: either every entry becomes
    /// durable or none does.
    fn append_batch(&self, work_item: &str, batch: &[LedgerEntry]) -> Result<()>;
}

/// Wholesale replacement, reserved for checkpoint restore.
pub trait LedgerRollback: LedgerStore {
    fn restore(&self, work_item: &str, entries: &[LedgerEntry]) -> Result<()>;
}

/// Task numbers with at least one `completed` entry.
pub fn completed_tasks(entries: &[LedgerEntry]) -> BTreeSet<TaskNumber> {
    entries
        .iter()
        .filter(|e| e.is_completed())
        .map(|e| e.task)
        .collect()
}

/// Check that every entry in a batch belongs to `work_item`.
fn check_batch(work_item: &str, batch: &[LedgerEntry]) -> Result<()> {
    if let Some(stray) = batch.iter().find(|e| e.work_item != work_item) {
        bail!(
            "Ledger entry for task {} belongs to '{}', not '{}'",
            stray.task,
            stray.work_item,
            work_item
        );
    }
    Ok(())
}

/// In-memory ledger for tests and dry runs.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<BTreeMap<String, Vec<LedgerEntry>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn entries(&self, work_item: &str) -> Result<Vec<LedgerEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Ledger lock poisoned"))?;
        Ok(entries.get(work_item).cloned().unwrap_or_default())
    }

    fn append_batch(&self, work_item: &str, batch: &[LedgerEntry]) -> Result<()> {
        check_batch(work_item, batch)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Ledger lock poisoned"))?;
        entries
            .entry(work_item.to_string())
            .or_default()
            .extend_from_slice(batch);
        Ok(())
    }
}

impl LedgerRollback for MemoryLedger {
    fn restore(&self, work_item: &str, restored: &[LedgerEntry]) -> Result<()> {
        check_batch(work_item, restored)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Ledger lock poisoned"))?;
        entries.insert(work_item.to_string(), restored.to_vec());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn entry(work_item: &str, task: TaskNumber, status: EntryStatus) -> LedgerEntry {
    LedgerEntry {
        work_item: work_item.to_string(),
        task,
        timestamp: Utc::now(),
        files_created: Vec::new(),
        files_modified: Vec::new(),
        files_deleted: Vec::new(),
        decisions: Vec::new(),
        issues_resolved: Vec::new(),
        status,
        error: None,
    }
}
