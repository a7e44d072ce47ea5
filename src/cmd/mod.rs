//! CLI command implementations.
//!
//! | Module       | Commands handled                                          |
//! |--------------|-----------------------------------------------------------|
//! | `project`    | `Init`, `Import`, `List`                                  |
//! | `item`       | `Validate`, `Plan`, `Status`, `Transition`, `Summarize`, `Ledger` |
//! | `run`        | `Run`                                                     |
//! | `checkpoint` | `Checkpoint`                                              |

pub mod checkpoint;
pub mod item;
pub mod project;
pub mod run;

pub use checkpoint::cmd_checkpoint;
pub use item::{cmd_ledger, cmd_plan, cmd_status, cmd_summarize, cmd_transition, cmd_validate};
pub use project::{cmd_import, cmd_init, cmd_list};
pub use run::{RunOptions, cmd_run};

use super::Cli;
use anyhow::Result;
use std::path::Path;
use weft::config::Config;

/// Load runtime config for an initialized project.
pub fn load_config(project_dir: &Path, cli: &Cli) -> Result<Config> {
    if !weft::init::is_initialized(project_dir) {
        anyhow::bail!("Project not initialized. Run 'weft init' first.");
    }
    let config = Config::new(project_dir.to_path_buf(), cli.verbose)?;
    for warning in config.settings.validate() {
        tracing::warn!(warning = %warning, "Configuration warning");
    }
    Ok(config)
}
