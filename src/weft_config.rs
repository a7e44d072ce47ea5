//! Settings read from `.weft/weft.toml`.
//!
//! Layered file → environment → CLI. A missing file means defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [validation]
//! threshold = 70
//!
//! [scheduler]
//! concurrency = "always"      # or "never"
//! concurrent_phases = [2, 3]  # honoured when concurrency = "never"
//!
//! [capabilities.code]
//! command = "./scripts/agent.sh"
//! bundles = ["rust-conventions"]
//!
//! [[capabilities.code.triggers]]
//! keywords = ["endpoint", "route"]
//! bundle = "api-design"
//! ```

use crate::atomicity::DEFAULT_THRESHOLD;
use crate::capability::{CapabilityRegistry, CommandProvider};
use crate::context::{BundleCatalog, CapabilityBundles, KeywordTrigger};
use crate::dag::ConcurrencyRequest;
use crate::orchestrator::RunSettings;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_FILE: &str = "weft.toml";

/// Environment variable overriding `[validation] threshold`.
pub const THRESHOLD_ENV: &str = "WEFT_VALIDATION_THRESHOLD";
/// Environment variable overriding `[scheduler] concurrency`.
pub const CONCURRENCY_ENV: &str = "WEFT_CONCURRENCY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Minimum atomicity score a task needs to be dispatched.
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    #[default]
    Always,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default)]
    pub concurrency: ConcurrencyMode,
    /// 1-based phases that still request concurrency when `concurrency = "never"`.
    #[serde(default)]
    pub concurrent_phases: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSection {
    pub keywords: Vec<String>,
    pub bundle: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySection {
    /// Shell command run for each task of this capability.
    #[serde(default)]
    pub command: Option<String>,
    /// Bundles every task of this capability receives.
    #[serde(default)]
    pub bundles: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerSection>,
}

/// The complete weft.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeftToml {
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilitySection>,
}

impl WeftToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse weft.toml")
    }

    /// Load `<weft_dir>/weft.toml`, or defaults if it does not exist.
    pub fn load_or_default(weft_dir: &Path) -> Result<Self> {
        let path = weft_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize weft.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn concurrency_request(&self) -> ConcurrencyRequest {
        match self.scheduler.concurrency {
            ConcurrencyMode::Always => ConcurrencyRequest::Always,
            ConcurrencyMode::Never if self.scheduler.concurrent_phases.is_empty() => {
                ConcurrencyRequest::Never
            }
            ConcurrencyMode::Never => ConcurrencyRequest::Phases(
                self.scheduler.concurrent_phases.iter().copied().collect::<BTreeSet<_>>(),
            ),
        }
    }

    /// Which bundles each capability declares.
    pub fn bundle_catalog(&self) -> BundleCatalog {
        self.capabilities
            .iter()
            .fold(BundleCatalog::new(), |catalog, (id, section)| {
                catalog.with_capability(
                    id,
                    CapabilityBundles {
                        base: section.bundles.clone(),
                        triggers: section
                            .triggers
                            .iter()
                            .map(|t| KeywordTrigger {
                                keywords: t.keywords.clone(),
                                bundle: t.bundle.clone(),
                            })
                            .collect(),
                    },
                )
            })
    }

    /// A command provider for every capability that declares a command.
    pub fn capability_registry(&self, working_dir: &Path) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for (id, section) in &self.capabilities {
            if let Some(ref command) = section.command {
                registry.register(id, Arc::new(CommandProvider::new(command, working_dir)));
            }
        }
        registry
    }

    /// Problems worth warning about; none of them stop a run on their own.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.validation.threshold > 100 {
            warnings.push(format!(
                "validation.threshold {} is above 100; no task can pass",
                self.validation.threshold
            ));
        }
        if self.scheduler.concurrent_phases.contains(&0) {
            warnings.push("scheduler.concurrent_phases uses 1-based phase numbers; 0 never matches".into());
        }
        if self.scheduler.concurrency == ConcurrencyMode::Always
            && !self.scheduler.concurrent_phases.is_empty()
        {
            warnings.push(
                "scheduler.concurrent_phases has no effect while concurrency = \"always\"".into(),
            );
        }
        for (id, section) in &self.capabilities {
            if section.command.is_none() {
                warnings.push(format!("capabilities.{} has no command", id));
            }
            for trigger in &section.triggers {
                if trigger.keywords.iter().all(|k| k.trim().is_empty()) {
                    warnings.push(format!(
                        "capabilities.{} trigger for bundle '{}' has no keywords",
                        id, trigger.bundle
                    ));
                }
            }
        }
        warnings
    }
}

/// Merged settings for one invocation.
#[derive(Debug, Clone)]
pub struct WeftConfig {
    pub project_dir: PathBuf,
    pub weft_dir: PathBuf,
    pub toml: WeftToml,
    /// CLI override for the validation threshold.
    pub cli_threshold: Option<u8>,
    /// CLI override for phase concurrency.
    pub cli_concurrency: Option<ConcurrencyRequest>,
}

impl WeftConfig {
    /// Load the file and apply environment overrides.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let weft_dir = project_dir.join(crate::init::WEFT_DIR);
        let mut toml = WeftToml::load_or_default(&weft_dir)?;
        apply_env(&mut toml, |key| std::env::var(key).ok())?;

        Ok(Self {
            project_dir,
            weft_dir,
            toml,
            cli_threshold: None,
            cli_concurrency: None,
        })
    }

    /// Threshold (CLI → env → file → default).
    pub fn threshold(&self) -> u8 {
        self.cli_threshold.unwrap_or(self.toml.validation.threshold)
    }

    /// Concurrency request (CLI → env → file → default).
    pub fn concurrency(&self) -> ConcurrencyRequest {
        self.cli_concurrency
            .clone()
            .unwrap_or_else(|| self.toml.concurrency_request())
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings::default()
            .with_threshold(self.threshold())
            .with_concurrency(self.concurrency())
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

/// Apply `WEFT_*` overrides. `lookup` is injected so tests need not touch the
/// process environment.
fn apply_env(toml: &mut WeftToml, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(raw) = lookup(THRESHOLD_ENV) {
        let threshold: u8 = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", THRESHOLD_ENV, raw))?;
        if threshold > 100 {
            bail!("Invalid {}: {} is above 100", THRESHOLD_ENV, threshold);
        }
        toml.validation.threshold = threshold;
    }
    if let Some(raw) = lookup(CONCURRENCY_ENV) {
        toml.scheduler.concurrency = match raw.trim().to_lowercase().as_str() {
            "always" => ConcurrencyMode::Always,
            "never" => ConcurrencyMode::Never,
            _ => bail!(
                "Invalid {}: '{}'. Valid options: always, never",
                CONCURRENCY_ENV,
                raw
            ),
        };
    }
    Ok(())
}
