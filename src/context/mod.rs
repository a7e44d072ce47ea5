//! Per-phase context cache.
//!
//! Before a phase dispatches, the orchestrator resolves which bundles the phase's
//! pending tasks need: every base bundle of each distinct capability, plus any
//! bundle whose trigger keywords appear in a task's title or description. Each
//! distinct bundle is loaded exactly once and shared read-only through `Arc`.
//!
//! The cache lives for one phase. The orchestrator drops it when the phase
//! resolves, whatever the outcome.
//!
//! # Bundle layout
//!
//! ```text
//! .weft/bundles/
//! ├── rust-conventions.md
//! ├── testing-strategy.md
//! └── api-design.md
//! ```

use crate::errors::WeftError;
use crate::work_item::{Task, TaskNumber};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// File extension for bundle content.
pub const BUNDLE_EXTENSION: &str = "md";

/// A named block of read-only context handed to capability providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bundle {
    pub name: String,
    pub content: String,
}

/// Where bundle content comes from.
pub trait BundleSource: Send + Sync {
    fn load(&self, name: &str) -> Result<Bundle>;
}

/// Loads `<dir>/<name>.md`.
pub struct FileBundleSource {
    dir: PathBuf,
}

impl FileBundleSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Names of all bundles on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).context("Failed to read bundles directory")? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BUNDLE_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl BundleSource for FileBundleSource {
    fn load(&self, name: &str) -> Result<Bundle> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Invalid bundle name '{}'", name);
        }
        let path = self.dir.join(format!("{}.{}", name, BUNDLE_EXTENSION));
        if !path.exists() {
            bail!("No bundle file at {}", path.display());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bundle file: {}", path.display()))?;
        Ok(Bundle {
            name: name.to_string(),
            content,
        })
    }
}

/// Source used when no bundle directory is configured. Every load fails, so a
/// catalog that declares bundles surfaces as a resource error.
pub struct NoBundleSource;

impl BundleSource for NoBundleSource {
    fn load(&self, name: &str) -> Result<Bundle> {
        bail!("No bundle source configured (requested '{}')", name)
    }
}

/// A bundle pulled in when any keyword appears in a task's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTrigger {
    pub keywords: Vec<String>,
    pub bundle: String,
}

impl KeywordTrigger {
    fn matches(&self, text_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && text_lower.contains(&k.to_lowercase()))
    }
}

/// Bundles declared for one capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityBundles {
    pub base: Vec<String>,
    pub triggers: Vec<KeywordTrigger>,
}

/// Capability id -> declared bundles.
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    capabilities: BTreeMap<String, CapabilityBundles>,
}

impl BundleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: &str, bundles: CapabilityBundles) -> Self {
        self.capabilities.insert(capability.to_string(), bundles);
        self
    }

    /// Bundle names a single task needs, sorted.
    pub fn required_for(&self, task: &Task) -> BTreeSet<String> {
        let Some(declared) = self.capabilities.get(&task.capability) else {
            return BTreeSet::new();
        };
        let text = task.text().to_lowercase();
        declared
            .base
            .iter()
            .cloned()
            .chain(
                declared
                    .triggers
                    .iter()
                    .filter(|t| t.matches(&text))
                    .map(|t| t.bundle.clone()),
            )
            .collect()
    }
}

/// Bundles loaded for one phase.
#[derive(Debug)]
pub struct ContextCache {
    phase: usize,
    bundles: BTreeMap<String, Arc<Bundle>>,
    per_task: BTreeMap<TaskNumber, BTreeSet<String>>,
}

impl ContextCache {
    /// Resolve and load every bundle the given tasks need, each exactly once.
    pub fn populate(
        phase: usize,
        tasks: &[&Task],
        catalog: &BundleCatalog,
        source: &dyn BundleSource,
    ) -> Result<Self, WeftError> {
        let per_task: BTreeMap<TaskNumber, BTreeSet<String>> = tasks
            .iter()
            .map(|t| (t.number, catalog.required_for(t)))
            .collect();
        let required: BTreeSet<&String> = per_task.values().flatten().collect();

        let mut bundles = BTreeMap::new();
        for name in required {
            let bundle = source
                .load(name)
                .map_err(|e| WeftError::ResourceUnavailable {
                    phase,
                    bundle: name.clone(),
                    reason: format!("{:#}", e),
                    report: None,
                })?;
            bundles.insert(name.clone(), Arc::new(bundle));
        }

        tracing::debug!(phase, bundles = bundles.len(), "Context cache populated");
        Ok(Self {
            phase,
            bundles,
            per_task,
        })
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Number of distinct bundles loaded.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Bundle>> {
        self.bundles.get(name).cloned()
    }

    /// Shared handles to the bundles `task` needs, in name order.
    pub fn context_for(&self, task: TaskNumber) -> Vec<Arc<Bundle>> {
        self.per_task
            .get(&task)
            .into_iter()
            .flatten()
            .filter_map(|name| self.bundles.get(name).cloned())
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingSource;
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> BundleCatalog {
        BundleCatalog::new()
            .with_capability(
                "code",
                CapabilityBundles {
                    base: vec!["conventions".into()],
                    triggers: vec![KeywordTrigger {
                        keywords: vec!["endpoint".into(), "route".into()],
                        bundle: "api-design".into(),
                    }],
                },
            )
            .with_capability(
                "docs",
                CapabilityBundles {
                    base: vec!["style-guide".into(), "conventions".into()],
                    triggers: vec![],
                },
            )
    }

    #[test]
    fn test_required_bundles_include_triggers() {
        let catalog = catalog();
        let api = Task::new(1, "Serve export Endpoint", "code");
        let plain = Task::new(2, "Parse config", "code");
        let unknown = Task::new(3, "Anything", "deploy");

        assert_eq!(
            catalog.required_for(&api),
            BTreeSet::from(["api-design".to_string(), "conventions".to_string()])
        );
        assert_eq!(
            catalog.required_for(&plain),
            BTreeSet::from(["conventions".to_string()])
        );
        assert!(catalog.required_for(&unknown).is_empty());
    }

    #[test]
    fn test_each_bundle_loaded_once_and_shared() {
        let source = CountingSource::with(&["conventions", "api-design", "style-guide"]);
        let t1 = Task::new(1, "Add route", "code");
        let t2 = Task::new(2, "Add endpoint", "code");
        let t3 = Task::new(3, "Describe export", "docs");

        let cache = ContextCache::populate(1, &[&t1, &t2, &t3], &catalog(), &source).unwrap();

        assert_eq!(cache.len(), 3);
        assert_eq!(source.load_count("conventions"), 1);
        assert_eq!(source.load_count("api-design"), 1);

        let a = cache.context_for(1);
        let b = cache.context_for(3);
        let shared_a = a.iter().find(|b| b.name == "conventions").unwrap();
        let shared_b = b.iter().find(|b| b.name == "conventions").unwrap();
        assert!(Arc::ptr_eq(shared_a, shared_b));
        assert_eq!(
            cache.context_for(3).iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            vec!["conventions", "style-guide"]
        );
    }

    #[test]
    fn test_missing_bundle_is_resource_unavailable() {
        let source = CountingSource::with(&["conventions"]);
        let task = Task::new(1, "Add route", "code");

        let err = ContextCache::populate(4, &[&task], &catalog(), &source).unwrap_err();
        match err {
            WeftError::ResourceUnavailable { phase, bundle, .. } => {
                assert_eq!(phase, 4);
                assert_eq!(bundle, "api-design");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_file_source_loads_markdown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("conventions.md"), "Use small modules.").unwrap();
        let source = FileBundleSource::new(dir.path().to_path_buf());

        let bundle = source.load("conventions").unwrap();
        assert_eq!(bundle.content, "Use small modules.");
        assert!(source.load("missing").is_err());
        assert!(source.load("../etc/passwd").is_err());
        assert_eq!(source.list().unwrap(), vec!["conventions"]);
    }
}
