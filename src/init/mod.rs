//! `weft init`: scaffold the `.weft/` directory.
//!
//! ```text
//! .weft/
//! ├── weft.toml        # settings, written with defaults on first init
//! ├── items/           # one directory per work item
//! ├── bundles/         # context bundles (<name>.md)
//! ├── checkpoints/
//! └── logs/
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// The name of the weft directory inside a project.
pub const WEFT_DIR: &str = ".weft";

const SUBDIRECTORIES: &[&str] = &["items", "bundles", "checkpoints", "logs"];

/// Written to `weft.toml` when none exists.
pub const DEFAULT_TOML: &str = r#"# weft settings

[validation]
# Minimum atomicity score (0-100) a task needs before it is dispatched.
threshold = 70

[scheduler]
# "always": phases with no internal dependency run concurrently.
# "never": every phase runs sequentially, except those in concurrent_phases.
concurrency = "always"
concurrent_phases = []

# One table per capability. The command receives the task request as JSON on
# stdin and may print a task outcome as JSON on stdout.
#
# [capabilities.code]
# command = "./scripts/code-agent.sh"
# bundles = ["conventions"]
#
# [[capabilities.code.triggers]]
# keywords = ["endpoint", "route"]
# bundle = "api-design"
"#;

#[derive(Debug)]
pub struct InitResult {
    pub weft_dir: PathBuf,
    /// False if the directory already existed.
    pub created: bool,
}

/// Create `.weft/` under `project_dir`, or complete a partial one. Existing
/// files are never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let weft_dir = get_weft_dir(project_dir);
    let created = !weft_dir.exists();

    for sub in SUBDIRECTORIES {
        let path = weft_dir.join(sub);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    let config_file = weft_dir.join(crate::weft_config::CONFIG_FILE);
    if !config_file.exists() {
        std::fs::write(&config_file, DEFAULT_TOML)
            .with_context(|| format!("Failed to create {}", config_file.display()))?;
    }

    tracing::debug!(dir = %weft_dir.display(), created, "Project initialized");
    Ok(InitResult { weft_dir, created })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    get_weft_dir(project_dir).exists()
}

pub fn get_weft_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(WEFT_DIR)
}
