//! Injected work item storage.
//!
//! The orchestrator never reaches for a global catalog; it receives a
//! `WorkItemRegistry` and calls `load`/`save` explicitly.

use super::{WorkItem, validate_id};
use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage for work item records.
pub trait WorkItemRegistry: Send + Sync {
    fn load(&self, id: &str) -> Result<WorkItem>;
    fn save(&self, item: &WorkItem) -> Result<()>;
    fn exists(&self, id: &str) -> bool;
    /// Ids of all stored work items, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// Registry backed by `.weft/items/<id>/work_item.json`.
pub struct FileWorkItemRegistry {
    items_dir: PathBuf,
}

impl FileWorkItemRegistry {
    pub fn new(items_dir: PathBuf) -> Self {
        Self { items_dir }
    }

    pub fn item_dir(&self, id: &str) -> PathBuf {
        self.items_dir.join(id)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join("work_item.json")
    }
}

impl WorkItemRegistry for FileWorkItemRegistry {
    fn load(&self, id: &str) -> Result<WorkItem> {
        validate_id(id)?;
        let path = self.record_path(id);
        if !path.exists() {
            bail!("Work item '{}' not found", id);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn save(&self, item: &WorkItem) -> Result<()> {
        validate_id(&item.id)?;
        let dir = self.item_dir(&item.id);
        fs::create_dir_all(&dir).context("Failed to create work item directory")?;
        let json =
            serde_json::to_string_pretty(item).context("Failed to serialize work item")?;
        write_atomic(&self.record_path(&item.id), json.as_bytes())
    }

    fn exists(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.record_path(id).exists()
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.items_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.items_dir).context("Failed to read items directory")? {
            let entry = entry?;
            if entry.path().join("work_item.json").exists()
                && let Some(name) = entry.file_name().to_str()
            {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Write `bytes` to a sibling temp file, fsync it, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid path: {}", path.display()))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// In-memory registry, one per test case.
#[derive(Default)]
pub struct MemoryWorkItemRegistry {
    items: Mutex<BTreeMap<String, WorkItem>>,
}

impl MemoryWorkItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(item: WorkItem) -> Self {
        let registry = Self::new();
        if let Ok(mut items) = registry.items.lock() {
            items.insert(item.id.clone(), item);
        }
        registry
    }
}

impl WorkItemRegistry for MemoryWorkItemRegistry {
    fn load(&self, id: &str) -> Result<WorkItem> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("Work item registry lock poisoned"))?;
        items
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("Work item '{}' not found", id))
    }

    fn save(&self, item: &WorkItem) -> Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow!("Work item registry lock poisoned"))?;
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn exists(&self, id: &str) -> bool {
        self.items
            .lock()
            .map(|items| items.contains_key(id))
            .unwrap_or(false)
    }

    fn list(&self) -> Result<Vec<String>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow!("Work item registry lock poisoned"))?;
        Ok(items.keys().cloned().collect())
    }
}
