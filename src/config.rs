use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::checkpoint::CheckpointStore;
use crate::context::FileBundleSource;
use crate::ledger::FileLedger;
use crate::weft_config::WeftConfig;
use crate::work_item::FileWorkItemRegistry;

/// Runtime configuration.
///
/// Resolves every path under `.weft/` and carries the merged [`WeftConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub weft_dir: PathBuf,
    pub items_dir: PathBuf,
    pub bundles_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub log_dir: PathBuf,
    pub verbose: bool,
    pub settings: WeftConfig,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let settings = WeftConfig::new(project_dir.clone())?;

        let weft_dir = settings.weft_dir.clone();
        Ok(Self {
            items_dir: weft_dir.join("items"),
            bundles_dir: weft_dir.join("bundles"),
            checkpoints_dir: weft_dir.join("checkpoints"),
            log_dir: weft_dir.join("logs"),
            weft_dir,
            project_dir,
            verbose,
            settings,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.items_dir).context("Failed to create items directory")?;
        std::fs::create_dir_all(&self.bundles_dir).context("Failed to create bundles directory")?;
        std::fs::create_dir_all(&self.checkpoints_dir)
            .context("Failed to create checkpoints directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    pub fn registry(&self) -> FileWorkItemRegistry {
        FileWorkItemRegistry::new(self.items_dir.clone())
    }

    pub fn ledger(&self) -> FileLedger {
        FileLedger::new(self.items_dir.clone())
    }

    pub fn bundle_source(&self) -> FileBundleSource {
        FileBundleSource::new(self.bundles_dir.clone())
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.checkpoints_dir.clone())
    }
}
