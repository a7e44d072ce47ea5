//! Integration tests for weft
//!
//! These drive the binary end to end against a temporary project, using shell
//! commands as capability providers.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a weft Command
fn weft() -> Command {
    cargo_bin_cmd!("weft")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to initialize a weft project in a temp directory
fn init_weft_project(dir: &TempDir) {
    weft()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// Replace weft.toml with one declaring a `code` capability running `command`.
fn configure_capability(dir: &TempDir, command: &str) {
    let toml = format!(
        "[validation]\nthreshold = 70\n\n[capabilities.code]\ncommand = '''{}'''\n",
        command
    );
    fs::write(dir.path().join(".weft/weft.toml"), toml).unwrap();
}

fn task_json(number: u32, title: &str, deps: &[u32]) -> String {
    format!(
        r#"{{"number": {}, "title": "{}", "description": "Expose a handler for the report.", "capability": "code", "dependencies": {:?}, "acceptance_criteria": ["Returns 200", "Body is CSV", "Header row present"]}}"#,
        number, title, deps
    )
}

/// Write an import file with the given task JSON objects and import it.
fn import_work_item(dir: &TempDir, id: &str, tasks: &[String]) {
    let path = dir.path().join(format!("{}.json", id));
    let body = format!(
        r#"{{"id": "{}", "title": "Monthly CSV export", "tasks": [{}]}}"#,
        id,
        tasks.join(",")
    );
    fs::write(&path, body).unwrap();
    weft()
        .current_dir(dir.path())
        .arg("import")
        .arg(&path)
        .assert()
        .success();
}

/// Three tasks: 1 and 2 independent, 3 depends on both.
fn standard_tasks() -> Vec<String> {
    vec![
        task_json(1, "Add CSV export endpoint", &[]),
        task_json(2, "Add CSV header builder", &[]),
        task_json(3, "Add CSV download link", &[1, 2]),
    ]
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_weft_help() {
        weft().arg("--help").assert().success();
    }

    #[test]
    fn test_weft_version() {
        weft().arg("--version").assert().success();
    }

    #[test]
    fn test_weft_init_creates_structure() {
        let dir = create_temp_project();

        weft()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized weft project"));

        assert!(dir.path().join(".weft/weft.toml").exists());
        assert!(dir.path().join(".weft/items").is_dir());
        assert!(dir.path().join(".weft/bundles").is_dir());
        assert!(dir.path().join(".weft/checkpoints").is_dir());
    }

    #[test]
    fn test_weft_init_idempotent() {
        let dir = create_temp_project();
        init_weft_project(&dir);

        weft()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_commands_require_init() {
        let dir = create_temp_project();

        weft()
            .current_dir(dir.path())
            .args(["list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("weft init"));
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        init_weft_project(&dir);

        weft()
            .arg("--project-dir")
            .arg(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No work items"));
    }
}

// =============================================================================
// Import, validate and plan
// =============================================================================

mod planning {
    use super::*;

    #[test]
    fn test_import_then_list() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("W1"))
            .stdout(predicate::str::contains("0/3 tasks"));
    }

    #[test]
    fn test_duplicate_import_refused() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .arg("import")
            .arg(dir.path().join("W1.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_import_rejects_unknown_dependency() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            format!(
                r#"{{"id": "W2", "title": "Bad", "tasks": [{}]}}"#,
                task_json(1, "Add CSV export endpoint", &[9])
            ),
        )
        .unwrap();

        weft()
            .current_dir(dir.path())
            .arg("import")
            .arg(&path)
            .assert()
            .code(2);
    }

    #[test]
    fn test_plan_groups_independent_tasks() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["plan", "W1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Phase 1 [concurrent]: 1, 2"))
            .stdout(predicate::str::contains("Phase 2 [sequential]: 3"));
    }

    #[test]
    fn test_plan_sequential_flag() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["plan", "W1", "--sequential"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Phase 1 [sequential]: 1, 2"));
    }

    #[test]
    fn test_plan_reports_cycle() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(
            &dir,
            "W1",
            &[
                task_json(1, "Add CSV export endpoint", &[2]),
                task_json(2, "Add CSV header builder", &[1]),
            ],
        );

        weft()
            .current_dir(dir.path())
            .args(["plan", "W1"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Next action"));
    }

    #[test]
    fn test_validate_passes_focused_tasks() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["validate", "W1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("All 3 tasks meet threshold 70"));

        let item = fs::read_to_string(dir.path().join(".weft/items/W1/work_item.json")).unwrap();
        assert!(item.contains("atomicity_score"));
    }

    #[test]
    fn test_validate_rejects_broad_task() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        let broad = r#"{"number": 1, "title": "Refactor and migrate the entire persistence layer then rewrite every module and update all endpoints across services", "description": "Complex distributed migration in Django and Docker.", "capability": "code"}"#;
        import_work_item(&dir, "W1", &[broad.to_string()]);

        weft()
            .current_dir(dir.path())
            .args(["validate", "W1"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("below threshold"));
    }
}

// =============================================================================
// Run and resume
// =============================================================================

mod running {
    use super::*;

    #[test]
    fn test_run_completes_work_item() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        configure_capability(&dir, "exit 0");
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Run completed"));

        weft()
            .current_dir(dir.path())
            .args(["status", "W1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("3/3 completed"))
            .stdout(predicate::str::contains("completed"));
    }

    #[test]
    fn test_run_without_capability_is_validation_error() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("code"));

        // Nothing was dispatched.
        assert!(!dir.path().join(".weft/items/W1/ledger.jsonl").exists());
    }

    #[test]
    fn test_partial_failure_halts_then_resume_finishes() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        configure_capability(
            &dir,
            r#"if [ "$WEFT_TASK" = "1" ] && [ ! -f fixed ]; then echo 'tests failed' >&2; exit 1; fi"#,
        );
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .code(5)
            .stdout(predicate::str::contains("Run halted"))
            .stdout(predicate::str::contains("Not attempted: 3"))
            .stderr(predicate::str::contains("fix-and-resume"));

        // A fresh run is refused once the ledger has entries.
        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("--resume"));

        fs::write(dir.path().join("fixed"), "").unwrap();

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--resume", "--ui", "minimal"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Previously completed: 2"));

        weft()
            .current_dir(dir.path())
            .args(["ledger", "W1", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("tests failed"))
            .stdout(predicate::str::contains(r#""task":3"#));
    }

    #[test]
    fn test_missing_bundle_aborts_with_report() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        fs::write(
            dir.path().join(".weft/weft.toml"),
            r#"[capabilities.code]
command = "exit 0"

[[capabilities.code.triggers]]
keywords = ["download"]
bundle = "link-design"
"#,
        )
        .unwrap();
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .code(7)
            .stdout(predicate::str::contains("Run aborted"))
            .stdout(predicate::str::contains("Succeeded: 1, 2"))
            .stdout(predicate::str::contains("Not attempted: 3"))
            .stderr(predicate::str::contains("link-design"));
    }

    #[test]
    fn test_run_json_ui_emits_report() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        configure_capability(&dir, "exit 0");
        import_work_item(&dir, "W1", &[task_json(1, "Add CSV export endpoint", &[])]);

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""work_item":"W1""#));
    }

    #[test]
    fn test_invalid_ui_mode() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "fancy"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Lifecycle and checkpoints
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_illegal_manual_transition() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["transition", "W1", "completed"])
            .assert()
            .code(4)
            .stderr(predicate::str::contains("abort"));
    }

    #[test]
    fn test_archive_then_run_refused() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        configure_capability(&dir, "exit 0");
        import_work_item(&dir, "W1", &standard_tasks());

        weft()
            .current_dir(dir.path())
            .args(["transition", "W1", "archived", "--note", "descoped"])
            .assert()
            .success()
            .stdout(predicate::str::contains("planned -> archived"));

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .code(4);

        // The manual override left a checkpoint behind.
        weft()
            .current_dir(dir.path())
            .args(["checkpoint", "list", "W1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("transition planned -> archived"));
    }

    #[test]
    fn test_summarize_after_run() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        configure_capability(&dir, "exit 0");
        import_work_item(&dir, "W1", &[task_json(1, "Add CSV export endpoint", &[])]);

        weft()
            .current_dir(dir.path())
            .args(["summarize", "W1"])
            .assert()
            .code(4);

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .success();

        weft()
            .current_dir(dir.path())
            .args(["summarize", "W1", "--note", "notes written"])
            .assert()
            .success();

        weft()
            .current_dir(dir.path())
            .args(["status", "W1", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""lifecycle": "summarized""#));
    }

    #[test]
    fn test_checkpoint_restore_rolls_back() {
        let dir = create_temp_project();
        init_weft_project(&dir);
        configure_capability(&dir, "exit 0");
        import_work_item(&dir, "W1", &[task_json(1, "Add CSV export endpoint", &[])]);

        weft()
            .current_dir(dir.path())
            .args(["checkpoint", "create", "W1", "before-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created checkpoint"));

        let checkpoint_id = fs::read_dir(dir.path().join(".weft/checkpoints"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
            })
            .next()
            .unwrap();

        weft()
            .current_dir(dir.path())
            .args(["run", "W1", "--ui", "minimal"])
            .assert()
            .success();

        weft()
            .current_dir(dir.path())
            .args(["--yes", "checkpoint", "restore", &checkpoint_id])
            .assert()
            .success()
            .stdout(predicate::str::contains("Restored checkpoint"));

        weft()
            .current_dir(dir.path())
            .args(["ledger", "W1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Ledger is empty"));

        weft()
            .current_dir(dir.path())
            .args(["status", "W1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("planned"));
    }

    #[test]
    fn test_restore_unknown_checkpoint_fails() {
        let dir = create_temp_project();
        init_weft_project(&dir);

        weft()
            .current_dir(dir.path())
            .args(["--yes", "checkpoint", "restore", "not-a-uuid"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid checkpoint id"));
    }
}
