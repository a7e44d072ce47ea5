//! JSON-lines ledger at `.weft/items/<id>/ledger.jsonl`.
//!
//! A batch write reads the current file, appends the batch, writes the result to
//! a temp file, fsyncs it and renames it over the ledger. A crash mid-write leaves
//! the previous ledger intact. An exclusive `fs2` lock on a sibling lock file
//! keeps a second process from writing concurrently.

use super::{LedgerEntry, LedgerRollback, LedgerStore, check_batch};
use crate::work_item::registry::write_atomic;
use anyhow::{Context, Result, bail};
use fs2::FileExt;
use std::fs;
use std::path::PathBuf;

pub struct FileLedger {
    items_dir: PathBuf,
}

/// Held for the duration of a write; released on drop.
struct WriterLock {
    file: fs::File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileLedger {
    pub fn new(items_dir: PathBuf) -> Self {
        Self { items_dir }
    }

    pub fn path(&self, work_item: &str) -> PathBuf {
        self.items_dir.join(work_item).join("ledger.jsonl")
    }

    fn lock(&self, work_item: &str) -> Result<WriterLock> {
        let dir = self.items_dir.join(work_item);
        fs::create_dir_all(&dir).context("Failed to create work item directory")?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join("ledger.lock"))
            .context("Failed to open ledger lock file")?;
        if file.try_lock_exclusive().is_err() {
            bail!(
                "Ledger for '{}' is locked by another writer",
                work_item
            );
        }
        Ok(WriterLock { file })
    }

    fn write_all(&self, work_item: &str, entries: &[LedgerEntry]) -> Result<()> {
        let mut content = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry).context("Failed to serialize ledger entry")?;
            content.push_str(&line);
            content.push('\n');
        }
        write_atomic(&self.path(work_item), content.as_bytes())
    }
}

impl LedgerStore for FileLedger {
    fn entries(&self, work_item: &str) -> Result<Vec<LedgerEntry>> {
        let path = self.path(work_item);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read ledger {}", path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Malformed ledger entry at {}:{}", path.display(), i + 1)
                })
            })
            .collect()
    }

    fn append_batch(&self, work_item: &str, batch: &[LedgerEntry]) -> Result<()> {
        check_batch(work_item, batch)?;
        if batch.is_empty() {
            return Ok(());
        }
        let _lock = self.lock(work_item)?;
        let mut entries = self.entries(work_item)?;
        entries.extend_from_slice(batch);
        self.write_all(work_item, &entries)?;
        tracing::debug!(work_item, entries = batch.len(), "Ledger batch written");
        Ok(())
    }
}

impl LedgerRollback for FileLedger {
    fn restore(&self, work_item: &str, entries: &[LedgerEntry]) -> Result<()> {
        check_batch(work_item, entries)?;
        let _lock = self.lock(work_item)?;
        self.write_all(work_item, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EntryStatus, entry};
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileLedger) {
        let dir = TempDir::new().unwrap();
        let ledger = FileLedger::new(dir.path().join("items"));
        (dir, ledger)
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let (_dir, ledger) = setup();
        assert!(ledger.entries("W1").unwrap().is_empty());
    }

    #[test]
    fn test_batches_append_and_persist() {
        let (dir, ledger) = setup();
        ledger
            .append_batch(
                "W1",
                &[
                    entry("W1", 1, EntryStatus::Completed),
                    entry("W1", 2, EntryStatus::Failed),
                ],
            )
            .unwrap();
        ledger
            .append_batch("W1", &[entry("W1", 2, EntryStatus::Completed)])
            .unwrap();

        let reopened = FileLedger::new(dir.path().join("items"));
        let entries = reopened.entries("W1").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].task, 1);
        assert_eq!(entries[2].status, EntryStatus::Completed);

        let raw = fs::read_to_string(ledger.path("W1")).unwrap();
        assert_eq!(raw.lines().count(), 3);
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let (_dir, ledger) = setup();
        ledger
            .append_batch("W1", &[entry("W1", 1, EntryStatus::Completed)])
            .unwrap();
        let path = ledger.path("W1");
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        fs::write(&path, raw).unwrap();

        let err = ledger.entries("W1").unwrap_err();
        assert!(err.to_string().contains(":2"));
    }

    #[test]
    fn test_concurrent_writer_is_refused() {
        let (_dir, ledger) = setup();
        let held = ledger.lock("W1").unwrap();
        let err = ledger
            .append_batch("W1", &[entry("W1", 1, EntryStatus::Completed)])
            .unwrap_err();
        assert!(err.to_string().contains("locked"));
        drop(held);
        ledger
            .append_batch("W1", &[entry("W1", 1, EntryStatus::Completed)])
            .unwrap();
    }

    #[test]
    fn test_restore_replaces_entries() {
        let (_dir, ledger) = setup();
        ledger
            .append_batch(
                "W1",
                &[
                    entry("W1", 1, EntryStatus::Completed),
                    entry("W1", 2, EntryStatus::Completed),
                ],
            )
            .unwrap();
        ledger
            .restore("W1", &[entry("W1", 1, EntryStatus::Completed)])
            .unwrap();
        assert_eq!(ledger.entries("W1").unwrap().len(), 1);
    }
}
