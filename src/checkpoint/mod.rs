//! Checkpoints: point-in-time snapshots of a work item and its ledger.
//!
//! A checkpoint is taken before any manual lifecycle override and before a
//! restore, so every rollback can itself be rolled back.

use crate::ledger::{LedgerEntry, LedgerRollback, LedgerStore};
use crate::work_item::{WorkItem, WorkItemRegistry};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// A stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// What was about to happen when the snapshot was taken.
    pub operation: String,
    pub work_item: WorkItem,
    pub ledger: Vec<LedgerEntry>,
}

/// Listing row; avoids handing the whole snapshot around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub work_item: String,
    pub operation: String,
    pub ledger_entries: usize,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            id: checkpoint.id,
            created_at: checkpoint.created_at,
            work_item: checkpoint.work_item.id.clone(),
            operation: checkpoint.operation.clone(),
            ledger_entries: checkpoint.ledger.len(),
        }
    }
}

/// Checkpoints stored as `<dir>/<uuid>.json`.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Snapshot the work item and its ledger.
    pub fn create<L: LedgerStore + ?Sized>(
        &self,
        registry: &dyn WorkItemRegistry,
        ledger: &L,
        work_item: &str,
        operation: &str,
    ) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            operation: operation.to_string(),
            work_item: registry.load(work_item)?,
            ledger: ledger.entries(work_item)?,
        };

        fs::create_dir_all(&self.dir).context("Failed to create checkpoints directory")?;
        let json = serde_json::to_string_pretty(&checkpoint)
            .context("Failed to serialize checkpoint")?;
        fs::write(self.path(checkpoint.id), json).context("Failed to write checkpoint file")?;

        tracing::info!(
            checkpoint = %checkpoint.id,
            work_item,
            operation,
            "Checkpoint created"
        );
        Ok(checkpoint)
    }

    pub fn load(&self, id: Uuid) -> Result<Checkpoint> {
        let path = self.path(id);
        if !path.exists() {
            bail!("Checkpoint {} not found", id);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Put the work item and ledger back to the snapshot. Returns the
    /// checkpoint taken of the state being replaced.
    pub fn restore(
        &self,
        id: Uuid,
        registry: &dyn WorkItemRegistry,
        ledger: &dyn LedgerRollback,
    ) -> Result<Checkpoint> {
        let checkpoint = self.load(id)?;
        let work_item = &checkpoint.work_item.id;
        let safety = self.create(
            registry,
            ledger,
            work_item,
            &format!("pre-restore of {}", id),
        )?;

        ledger
            .restore(work_item, &checkpoint.ledger)
            .context("Failed to restore ledger")?;
        registry
            .save(&checkpoint.work_item)
            .context("Failed to restore work item")?;

        tracing::info!(checkpoint = %id, work_item = %work_item, "Checkpoint restored");
        Ok(safety)
    }

    /// Checkpoints, oldest first, optionally for one work item.
    pub fn list(&self, work_item: Option<&str>) -> Result<Vec<CheckpointSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.dir).context("Failed to read checkpoints directory")? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let checkpoint: Checkpoint = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            if work_item.is_none_or(|id| checkpoint.work_item.id == id) {
                summaries.push(CheckpointSummary::from(&checkpoint));
            }
        }
        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }
}
