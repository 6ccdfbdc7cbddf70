//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const SPEC: &str = r#"
id: shop
title: Shop
features:
  - id: auth
    title: Authentication
    requirements:
      - id: login
        title: Login form
        priority: high
      - id: logout
        title: Logout
        depends_on: [login]
  - id: cart
    title: Cart
"#;

/// Get the binary to test, isolated from the user's global config.
fn charter(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("charter").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("CHARTER_ACTOR", "ana")
        .env_remove("CHARTER_PROJECT")
        .env_remove("RUST_LOG");
    cmd
}

/// A project with the shop spec and an approved plan.
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    charter(&dir).args(["init", "Shop"]).assert().success();
    dir.child(".charter/spec.yaml").write_str(SPEC).unwrap();
    charter(&dir).args(["plan", "generate"]).assert().success();
    charter(&dir).args(["plan", "approve"]).assert().success();
    dir
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Spec-driven plan execution"));
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_task_help_lists_lifecycle() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .args(["task", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unblock"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("charter"));
}

#[test]
fn test_unknown_command_fails() {
    let dir = TempDir::new().unwrap();
    charter(&dir).arg("frobnicate").assert().failure();
}

// ============================================================================
// Init Tests
// ============================================================================

#[test]
fn test_init_creates_project() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .args(["init", "My Project"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized charter project"));

    dir.child(".charter/spec.yaml").assert(predicate::str::contains("id: my-project"));
    dir.child(".charter/policy.yaml").assert(predicate::path::exists());
    dir.child(".charter/events.jsonl").assert(predicate::str::contains("project.init"));
}

#[test]
fn test_init_twice_requires_force() {
    let dir = TempDir::new().unwrap();
    charter(&dir).args(["init", "One"]).assert().success();
    charter(&dir)
        .args(["init", "Two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    charter(&dir).args(["init", "Two", "--force"]).assert().success();
    dir.child(".charter/spec.yaml").assert(predicate::str::contains("title: Two"));
}

#[test]
fn test_project_flag() {
    let dir = TempDir::new().unwrap();
    let sub = dir.child("nested");
    sub.create_dir_all().unwrap();
    charter(&dir).args(["--project", "nested", "init", "Nested"]).assert().success();
    sub.child(".charter/spec.yaml").assert(predicate::path::exists());
}

#[test]
fn test_commands_before_init_suggest_init() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .args(["plan", "generate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: No spec found"))
        .stderr(predicate::str::contains("charter init"));
}

// ============================================================================
// Plan Tests
// ============================================================================

#[test]
fn test_plan_generate_and_show() {
    let dir = project();
    charter(&dir)
        .args(["plan", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved"))
        .stdout(predicate::str::contains("task-login"))
        .stdout(predicate::str::contains("task-cart"))
        .stdout(predicate::str::contains("depends on: task-login"));
}

#[test]
fn test_plan_show_json() {
    let dir = project();
    let output = charter(&dir).args(["plan", "show", "--json"]).output().unwrap();
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["spec_id"], "shop");
    assert_eq!(plan["tasks"].as_array().unwrap().len(), 3);
}

#[test]
fn test_graph_check_prints_order() {
    let dir = project();
    charter(&dir)
        .args(["graph", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 tasks, no cycles"));
}

#[test]
fn test_generate_rejects_cycle() {
    let dir = TempDir::new().unwrap();
    charter(&dir).arg("init").assert().success();
    dir.child(".charter/spec.yaml")
        .write_str(
            r#"
id: loop
title: Loop
features:
  - id: f
    title: F
    requirements:
      - { id: a, title: A, depends_on: [b] }
      - { id: b, title: B, depends_on: [a] }
"#,
        )
        .unwrap();
    charter(&dir)
        .args(["plan", "generate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cyclic dependency"));
}

// ============================================================================
// Task Lifecycle Tests
// ============================================================================

#[test]
fn test_task_lifecycle() {
    let dir = project();
    charter(&dir)
        .args(["task", "start", "task-login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task-login: pending -> in_progress"));
    charter(&dir).args(["task", "complete", "task-login"]).assert().success();
    charter(&dir)
        .args(["task", "verify", "task-login", "--evidence", "CI #12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("done -> verified"));

    charter(&dir)
        .args(["timeline", "--task", "task-login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task.start"))
        .stdout(predicate::str::contains("task.verify"))
        .stdout(predicate::str::contains("ana"));
}

#[test]
fn test_locked_task_cannot_start() {
    let dir = project();
    charter(&dir)
        .args(["task", "start", "task-logout"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"))
        .stderr(predicate::str::contains("charter task complete task-login"));
}

#[test]
fn test_invalid_transition_has_hint() {
    let dir = project();
    charter(&dir)
        .args(["task", "complete", "task-login"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid transition"))
        .stderr(predicate::str::contains("charter task start task-login"));
}

#[test]
fn test_unknown_task() {
    let dir = project();
    charter(&dir)
        .args(["task", "start", "task-nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found in plan"));
}

#[test]
fn test_ready_tasks() {
    let dir = project();
    charter(&dir)
        .args(["task", "ready"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task-login"))
        .stdout(predicate::str::contains("task-cart"))
        .stdout(predicate::str::contains("task-logout").not());
}

#[test]
fn test_status_json() {
    let dir = project();
    charter(&dir).args(["task", "start", "task-cart"]).assert().success();
    let output = charter(&dir).args(["status", "--json"]).output().unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let cart = report["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["task_id"] == "task-cart")
        .unwrap()
        .clone();
    assert_eq!(cart["status"], "in_progress");
    assert_eq!(cart["owner"], "ana");
}

// ============================================================================
// Policy Tests
// ============================================================================

#[test]
fn test_wip_limit_blocks_second_start() {
    let dir = project();
    charter(&dir).args(["policy", "set", "--max-wip", "1"]).assert().success();
    charter(&dir).args(["task", "start", "task-login"]).assert().success();
    charter(&dir)
        .args(["task", "start", "task-cart"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("raise max_wip"));

    charter(&dir)
        .args(["policy", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wip"));
}

#[test]
fn test_policy_set_keeps_unset_values() {
    let dir = project();
    charter(&dir).args(["policy", "set", "--token-limit", "500"]).assert().success();
    charter(&dir).args(["policy", "set", "--budget-hours", "10"]).assert().success();
    charter(&dir)
        .args(["policy", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("token_limit: 500"))
        .stdout(predicate::str::contains("budget_hours: 10"));
}

#[test]
fn test_time_log_warns_over_budget() {
    let dir = project();
    charter(&dir).args(["policy", "set", "--budget-hours", "2"]).assert().success();
    charter(&dir)
        .args(["time", "log", "3", "--task", "task-login"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged 3h"))
        .stderr(predicate::str::contains("warning"));
}

// ============================================================================
// Drift & Forecast Tests
// ============================================================================

#[test]
fn test_drift_clean_then_detected() {
    let dir = project();
    charter(&dir)
        .arg("drift")
        .assert()
        .success()
        .stdout(predicate::str::contains("No drift"));

    dir.child(".charter/spec.yaml")
        .write_str(&SPEC.replace("  - id: cart\n    title: Cart\n", "  - id: search\n    title: Search\n"))
        .unwrap();

    charter(&dir)
        .arg("drift")
        .assert()
        .success()
        .stdout(predicate::str::contains("Spec changed"))
        .stdout(predicate::str::contains("missing-task"))
        .stdout(predicate::str::contains("orphan-task"));
    charter(&dir).args(["drift", "--strict"]).assert().failure();

    charter(&dir)
        .args(["plan", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task-cart"));
}

#[test]
fn test_forecast_without_history() {
    let dir = project();
    charter(&dir)
        .arg("forecast")
        .assert()
        .success()
        .stdout(predicate::str::contains("0/3 done"))
        .stdout(predicate::str::contains("unknown"));
}

#[test]
fn test_forecast_json_counts_completion() {
    let dir = project();
    charter(&dir).args(["task", "start", "task-cart"]).assert().success();
    charter(&dir).args(["task", "complete", "task-cart"]).assert().success();
    let output = charter(&dir).args(["forecast", "--json"]).output().unwrap();
    let forecast: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(forecast["completed"], 1);
    assert_eq!(forecast["remaining"], 2);
    assert!(forecast["velocity"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_timeline_limit() {
    let dir = project();
    let output = charter(&dir).args(["timeline", "--limit", "1", "--json"]).output().unwrap();
    let events: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["action"], "plan.approve");
}

// ============================================================================
// AI Decomposition Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_plan_generate_with_external_command() {
    let dir = project();
    dir.child(".charter/config.toml")
        .write_str(
            r#"
[ai]
command = "sh"
args = ["-c", "cat > /dev/null; echo '{\"tasks\":[{\"id\":\"task-x\",\"feature_id\":\"auth\",\"title\":\"X\"}],\"tokens_used\":120}'"]
"#,
        )
        .unwrap();

    charter(&dir)
        .args(["plan", "generate", "--ai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 tasks via AI"));
    dir.child(".charter/events.jsonl").assert(predicate::str::contains("ai.usage"));
}

#[test]
fn test_ai_without_command_fails() {
    let dir = project();
    charter(&dir)
        .args(["plan", "generate", "--ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no AI command configured"));
}

#[test]
fn test_ai_disabled_by_policy() {
    let dir = project();
    dir.child(".charter/config.toml")
        .write_str("[ai]\ncommand = \"true\"\n")
        .unwrap();
    charter(&dir).args(["policy", "set", "--allow-ai", "false"]).assert().success();
    charter(&dir)
        .args(["plan", "generate", "--ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("allow_ai"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_shows_defaults() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("short_window_days = 7"));
}

#[test]
fn test_config_path() {
    let dir = TempDir::new().unwrap();
    charter(&dir)
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".charter"));
}
