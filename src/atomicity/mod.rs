//! Atomicity scoring for decomposed tasks.
//!
//! [`score_task`] is a pure function: identical task text always produces the same
//! score, classification and violation list. A task starts at 100 and loses points
//! for each independent penalty:
//!
//! | Rule | Penalty |
//! |------|---------|
//! | Conjunctions in the title | 10 each, max 20 |
//! | More than one imperative verb in the title | 10 per extra verb, max 20 |
//! | Title longer than 12 / 20 words | 10 / 15 |
//! | Acceptance criteria outside 3-4 | 5 to 25, see [`criteria_penalty`] |
//! | Estimated files touched above 3 / 5 | 10 / 20 |
//! | Estimated duration above 60 / 120 minutes | 10 / 20 |
//! | Any named framework, library or tool | 15 (fixed) |
//! | More than 3 dependencies | 5 per extra, max 10 |

use crate::work_item::Task;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Minimum score the decomposition step must reach before scheduling.
pub const DEFAULT_THRESHOLD: u8 = 70;

static CONJUNCTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:and|or|plus|also|then|as well as)\b|&").unwrap());

static WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9.+#_-]*").unwrap());

static BROAD_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:across|entire|throughout|codebase|every (?:file|module|service)|all (?:files|modules|services|endpoints))\b")
        .unwrap()
});

const IMPERATIVE_VERBS: &[&str] = &[
    "add", "build", "configure", "create", "delete", "deploy", "design", "document",
    "extract", "fix", "implement", "integrate", "migrate", "modify", "move", "refactor",
    "remove", "rename", "replace", "rewrite", "test", "update", "validate", "write",
];

const CREATE_KEYWORDS: &[&str] = &["add", "create", "introduce", "new", "scaffold", "generate"];
const REMOVE_KEYWORDS: &[&str] = &["delete", "remove", "drop"];
const MODIFY_KEYWORDS: &[&str] = &[
    "update", "modify", "refactor", "change", "rename", "migrate", "replace", "rewrite",
];

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "architecture",
    "async",
    "complex",
    "concurrency",
    "concurrent",
    "distributed",
    "integration",
    "migration",
    "optimize",
    "performance",
    "security",
    "transaction",
];

/// Concrete technologies; tasks must stay implementation-agnostic.
/// Each entry is (lowercase token, display name).
const TECHNOLOGIES: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("angular", "Angular"),
    ("svelte", "Svelte"),
    ("next.js", "Next.js"),
    ("nextjs", "Next.js"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("rails", "Rails"),
    ("laravel", "Laravel"),
    ("spring", "Spring"),
    ("express", "Express"),
    ("jquery", "jQuery"),
    ("tailwind", "Tailwind"),
    ("webpack", "Webpack"),
    ("graphql", "GraphQL"),
    ("postgres", "Postgres"),
    ("postgresql", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("sqlite", "SQLite"),
    ("mongodb", "MongoDB"),
    ("redis", "Redis"),
    ("elasticsearch", "Elasticsearch"),
    ("kafka", "Kafka"),
    ("rabbitmq", "RabbitMQ"),
    ("docker", "Docker"),
    ("kubernetes", "Kubernetes"),
    ("terraform", "Terraform"),
    ("nginx", "nginx"),
    ("aws", "AWS"),
    ("gcp", "GCP"),
    ("azure", "Azure"),
    ("jest", "Jest"),
    ("pytest", "pytest"),
    ("tokio", "Tokio"),
    ("axum", "Axum"),
];

/// Technology names that are also ordinary English words. These only count when
/// capitalised somewhere other than the start of a sentence.
const AMBIGUOUS_TECHNOLOGIES: &[&str] = &[
    "react", "angular", "svelte", "flask", "rails", "spring", "express", "jest",
];

/// Quality band for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Excellent,
    Good,
    NeedsReview,
    MustSplit,
}

impl Classification {
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=100 => Classification::Excellent,
            70..=84 => Classification::Good,
            50..=69 => Classification::NeedsReview,
            _ => Classification::MustSplit,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Excellent => write!(f, "EXCELLENT"),
            Classification::Good => write!(f, "GOOD"),
            Classification::NeedsReview => write!(f, "NEEDS_REVIEW"),
            Classification::MustSplit => write!(f, "MUST_SPLIT"),
        }
    }
}

/// Which penalty produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    TitleConjunctions,
    MultipleVerbs,
    TitleLength,
    CriteriaCount,
    FileImpact,
    Duration,
    TechnologySpecificity,
    DependencyFanIn,
}

/// One applied penalty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
    pub penalty: u8,
    /// Offending tokens, when the rule is token-based.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

/// Full scoring result for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicityReport {
    pub score: u8,
    pub classification: Classification,
    pub violations: Vec<Violation>,
    pub estimated_files: u32,
    pub estimated_minutes: u32,
}

impl AtomicityReport {
    pub fn passes(&self, threshold: u8) -> bool {
        self.score >= threshold
    }
}

/// Score a task.
pub fn score_task(task: &Task) -> AtomicityReport {
    score(
        &task.title,
        &task.description,
        &task.acceptance_criteria,
        task.dependencies.len(),
    )
}

/// Score raw task parts.
pub fn score(
    title: &str,
    description: &str,
    criteria: &[String],
    dependency_count: usize,
) -> AtomicityReport {
    let mut violations = Vec::new();
    let title_words = words(title);
    let body = format!("{}\n{}", title, description);
    let body_words = words(&body);

    let conjunctions: Vec<String> = CONJUNCTIONS
        .find_iter(title)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if !conjunctions.is_empty() {
        violations.push(Violation {
            rule: Rule::TitleConjunctions,
            message: format!(
                "Title joins {} clauses with conjunctions",
                conjunctions.len() + 1
            ),
            penalty: (10 * conjunctions.len()).min(20) as u8,
            tokens: conjunctions,
        });
    }

    let verbs = distinct_matches(&title_words, IMPERATIVE_VERBS);
    if verbs.len() > 1 {
        violations.push(Violation {
            rule: Rule::MultipleVerbs,
            message: format!("Title asks for {} different actions", verbs.len()),
            penalty: (10 * (verbs.len() - 1)).min(20) as u8,
            tokens: verbs,
        });
    }

    let title_len = title_words.len();
    let length_penalty = match title_len {
        0..=12 => 0,
        13..=20 => 10,
        _ => 15,
    };
    if length_penalty > 0 {
        violations.push(Violation {
            rule: Rule::TitleLength,
            message: format!("Title has {} words", title_len),
            penalty: length_penalty,
            tokens: Vec::new(),
        });
    }

    let criteria_count = criteria.len();
    let penalty = criteria_penalty(criteria_count);
    if penalty > 0 {
        violations.push(Violation {
            rule: Rule::CriteriaCount,
            message: format!(
                "{} acceptance criteria (3-4 expected)",
                criteria_count
            ),
            penalty,
            tokens: Vec::new(),
        });
    }

    let estimated_files = estimate_files(&body, &body_words);
    let files_penalty = match estimated_files {
        0..=3 => 0,
        4..=5 => 10,
        _ => 20,
    };
    if files_penalty > 0 {
        violations.push(Violation {
            rule: Rule::FileImpact,
            message: format!("Touches an estimated {} files", estimated_files),
            penalty: files_penalty,
            tokens: Vec::new(),
        });
    }

    let complexity = distinct_prefix_matches(&body_words, COMPLEXITY_KEYWORDS);
    let estimated_minutes = 15 * estimated_files.max(1) + 15 * complexity.len() as u32;
    let duration_penalty = match estimated_minutes {
        0..=60 => 0,
        61..=120 => 10,
        _ => 20,
    };
    if duration_penalty > 0 {
        violations.push(Violation {
            rule: Rule::Duration,
            message: format!("Estimated {} minutes of work", estimated_minutes),
            penalty: duration_penalty,
            tokens: complexity,
        });
    }

    let technologies = named_technologies(&body, &body_words);
    if !technologies.is_empty() {
        violations.push(Violation {
            rule: Rule::TechnologySpecificity,
            message: format!("Names concrete technology: {}", technologies.join(", ")),
            penalty: 15,
            tokens: technologies,
        });
    }

    if dependency_count > 3 {
        violations.push(Violation {
            rule: Rule::DependencyFanIn,
            message: format!("Depends on {} tasks", dependency_count),
            penalty: (5 * (dependency_count - 3)).min(10) as u8,
            tokens: Vec::new(),
        });
    }

    let total: u32 = violations.iter().map(|v| v.penalty as u32).sum();
    let score = 100u32.saturating_sub(total) as u8;

    AtomicityReport {
        score,
        classification: Classification::from_score(score),
        violations,
        estimated_files,
        estimated_minutes,
    }
}

/// Penalty for the acceptance-criteria count. Three or four is ideal.
pub fn criteria_penalty(count: usize) -> u8 {
    match count {
        0 => 20,
        1 => 15,
        2 => 5,
        3 | 4 => 0,
        5 | 6 => 5,
        n => (10 + 5 * (n - 7)).min(25) as u8,
    }
}

fn words(text: &str) -> Vec<String> {
    WORDS
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', '-', '_'])
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Keywords from `list` present in `words`, in list order.
fn distinct_matches(words: &[String], list: &[&str]) -> Vec<String> {
    list.iter()
        .filter(|k| words.iter().any(|w| w == *k))
        .map(|k| k.to_string())
        .collect()
}

fn distinct_prefix_matches(words: &[String], list: &[&str]) -> Vec<String> {
    list.iter()
        .filter(|k| words.iter().any(|w| w.starts_with(*k)))
        .map(|k| k.to_string())
        .collect()
}

fn estimate_files(text: &str, words: &[String]) -> u32 {
    let created = distinct_matches(words, CREATE_KEYWORDS).len() as u32;
    let removed = distinct_matches(words, REMOVE_KEYWORDS).len() as u32;
    let modified = distinct_matches(words, MODIFY_KEYWORDS).len() as u32;
    let broad = BROAD_SCOPE.find_iter(text).count() as u32;
    created + removed + 2 * modified + 3 * broad
}

fn named_technologies(text: &str, words: &[String]) -> Vec<String> {
    let present: BTreeSet<&str> = words.iter().map(|w| w.as_str()).collect();
    let proper = proper_nouns(text);
    let mut found: Vec<String> = Vec::new();
    for (token, display) in TECHNOLOGIES {
        let named = if AMBIGUOUS_TECHNOLOGIES.contains(token) {
            proper.contains(*token)
        } else {
            present.contains(token)
        };
        if named && !found.iter().any(|f| f == display) {
            found.push(display.to_string());
        }
    }
    found
}

/// Lowercased capitalised words that do not open a sentence or a line.
fn proper_nouns(text: &str) -> BTreeSet<String> {
    WORDS
        .find_iter(text)
        .filter(|m| m.as_str().starts_with(|c: char| c.is_uppercase()))
        .filter(|m| {
            let before = text[..m.start()].trim_end_matches([' ', '\t']);
            !(before.is_empty() || before.ends_with(['.', '!', '?', ':', '\n']))
        })
        .map(|m| m.as_str().trim_end_matches(['.', '-', '_']).to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Criterion {i} holds")).collect()
    }

    #[test]
    fn test_focused_task_scores_excellent() {
        let report = score(
            "Add CSV export endpoint",
            "Expose a handler that returns the monthly report as CSV.",
            &criteria(3),
            1,
        );
        assert_eq!(report.score, 100);
        assert_eq!(report.classification, Classification::Excellent);
        assert!(report.violations.is_empty());
        assert_eq!(report.estimated_files, 1);
        assert_eq!(report.estimated_minutes, 15);
    }

    #[test]
    fn test_named_framework_forces_fixed_penalty() {
        let report = score(
            "Render usage chart",
            "Use React to draw the chart on the dashboard page.",
            &criteria(3),
            0,
        );
        let tech = report
            .violations
            .iter()
            .find(|v| v.rule == Rule::TechnologySpecificity)
            .unwrap();
        assert_eq!(tech.penalty, 15);
        assert_eq!(tech.tokens, vec!["React".to_string()]);
        assert!(tech.message.contains("React"));
        assert_eq!(report.score, 85);
    }

    #[test]
    fn test_ambiguous_technology_words_need_a_proper_noun() {
        let plain = score(
            "Express totals in cents",
            "Rails of the table spring open; react to clicks and express amounts.",
            &criteria(3),
            0,
        );
        assert!(
            plain
                .violations
                .iter()
                .all(|v| v.rule != Rule::TechnologySpecificity)
        );

        let named = score(
            "Serve invoice totals",
            "Mount the handler on the Express router.",
            &criteria(3),
            0,
        );
        let tech = named
            .violations
            .iter()
            .find(|v| v.rule == Rule::TechnologySpecificity)
            .unwrap();
        assert_eq!(tech.tokens, vec!["Express".to_string()]);
    }

    #[test]
    fn test_multiple_technologies_listed_in_catalog_order() {
        let report = score(
            "Store sessions",
            "Keep sessions in Redis behind nginx, backed by PostgreSQL.",
            &criteria(4),
            0,
        );
        let tech = report
            .violations
            .iter()
            .find(|v| v.rule == Rule::TechnologySpecificity)
            .unwrap();
        assert_eq!(tech.tokens, vec!["PostgreSQL", "Redis", "nginx"]);
        assert_eq!(tech.penalty, 15);
    }

    #[test]
    fn test_compound_title_penalized() {
        let report = score(
            "Add login form and update session store",
            "",
            &criteria(3),
            0,
        );
        let rules: Vec<Rule> = report.violations.iter().map(|v| v.rule).collect();
        assert!(rules.contains(&Rule::TitleConjunctions));
        assert!(rules.contains(&Rule::MultipleVerbs));
        let verbs = report
            .violations
            .iter()
            .find(|v| v.rule == Rule::MultipleVerbs)
            .unwrap();
        assert_eq!(verbs.tokens, vec!["add", "update"]);
    }

    #[test]
    fn test_criteria_penalty_curve() {
        assert_eq!(criteria_penalty(0), 20);
        assert_eq!(criteria_penalty(1), 15);
        assert_eq!(criteria_penalty(2), 5);
        assert_eq!(criteria_penalty(3), 0);
        assert_eq!(criteria_penalty(4), 0);
        assert_eq!(criteria_penalty(6), 5);
        assert_eq!(criteria_penalty(7), 10);
        assert_eq!(criteria_penalty(9), 20);
        assert_eq!(criteria_penalty(40), 25);
    }

    #[test]
    fn test_broad_task_must_split() {
        let report = score(
            "Refactor and migrate the entire persistence layer then rewrite every module and update all endpoints across services",
            "Complex distributed migration touching the codebase with performance and security concerns in Django and Docker.",
            &criteria(9),
            6,
        );
        assert_eq!(report.classification, Classification::MustSplit);
        assert!(report.score < 50);
        assert!(report.estimated_files > 5);
        assert!(report.estimated_minutes > 120);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let title = "Add retry to webhook sender and update docs";
        let description = "Retries use Kafka with complex backoff.";
        let first = score(title, description, &criteria(5), 4);
        for _ in 0..5 {
            assert_eq!(score(title, description, &criteria(5), 4), first);
        }
    }

    #[test]
    fn test_classification_bands() {
        assert_eq!(Classification::from_score(100), Classification::Excellent);
        assert_eq!(Classification::from_score(85), Classification::Excellent);
        assert_eq!(Classification::from_score(84), Classification::Good);
        assert_eq!(Classification::from_score(70), Classification::Good);
        assert_eq!(Classification::from_score(69), Classification::NeedsReview);
        assert_eq!(Classification::from_score(50), Classification::NeedsReview);
        assert_eq!(Classification::from_score(49), Classification::MustSplit);
        assert_eq!(Classification::MustSplit.to_string(), "MUST_SPLIT");
    }

    #[test]
    fn test_score_task_uses_dependency_count() {
        let task = Task::new(5, "Wire exporter", "code")
            .with_criteria(&["a", "b", "c"])
            .with_dependencies([1, 2, 3, 4, 5]);
        let report = score_task(&task);
        let fan_in = report
            .violations
            .iter()
            .find(|v| v.rule == Rule::DependencyFanIn)
            .unwrap();
        assert_eq!(fan_in.penalty, 10);
        assert!(report.passes(DEFAULT_THRESHOLD));
    }
}
