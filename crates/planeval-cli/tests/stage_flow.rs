//! Stage-level behavior of `run-plans`: worktree isolation, task-local
//! failure handling, and idempotent re-runs.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use planeval_core::EvalConfig;
use planeval_state::{
    Difficulty, FsTaskLedger, GroundTruth, RunStatus, TaskLedger, TaskObject, TaskType,
};

use planeval_cli::stages;

fn git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initialize a repository at `config.repo_dir()` and return its HEAD sha.
fn seed_repo(config: &EvalConfig) -> String {
    let repo = config.repo_dir();
    std::fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-b", "main"]);
    git(&repo, &["config", "user.name", "test-user"]);
    git(&repo, &["config", "user.email", "test@example.com"]);
    std::fs::write(repo.join("README.md"), "seed\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "initial"]);
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(&repo)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn test_config(data_dir: PathBuf, agent_cmd: &[&str], timeout_secs: u64) -> EvalConfig {
    EvalConfig {
        repo_url: "https://github.com/acme/widget".to_string(),
        data_dir,
        agent_cmd: agent_cmd.iter().map(|s| s.to_string()).collect(),
        plan_timeout_secs: timeout_secs,
        max_concurrency: 2,
        ..Default::default()
    }
}

fn task(task_id: &str, prompt: &str, commit: &str) -> TaskObject {
    TaskObject {
        task_id: task_id.to_string(),
        prompt: prompt.to_string(),
        repo_state_commit: commit.to_string(),
        ground_truth: GroundTruth::default(),
        difficulty: Difficulty::Medium,
        task_type: TaskType::FeatureRequest,
    }
}

#[tokio::test]
async fn plans_are_captured_per_task() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), &["echo"], 30);
    let head = seed_repo(&config);

    let ledger: Arc<dyn TaskLedger> =
        Arc::new(FsTaskLedger::open(config.ledger_dir()).unwrap());
    ledger.put_task(&task("task_001", "add feature one", &head)).await.unwrap();
    ledger.put_task(&task("task_002", "add feature two", &head)).await.unwrap();

    let report = stages::run_plans(&config, Arc::clone(&ledger), false)
        .await
        .unwrap();
    assert_eq!(report.complete, 2);
    assert_eq!(report.failed, 0);

    let entry = ledger.get_entry("task_001").await.unwrap().unwrap();
    let plan = entry.plan.unwrap();
    assert_eq!(plan.status, RunStatus::Success);
    assert!(plan.text.contains("add feature one"));
}

#[tokio::test]
async fn one_timeout_leaves_sibling_tasks_unaffected() {
    let dir = tempfile::tempdir().unwrap();
    // The prompt lands in $0; tasks asking to be SLOW sleep past the budget
    let script = r#"case "$0" in SLOW*) sleep 5;; *) echo planned;; esac"#;
    let config = test_config(dir.path().to_path_buf(), &["sh", "-c", script], 1);
    let head = seed_repo(&config);

    let ledger: Arc<dyn TaskLedger> =
        Arc::new(FsTaskLedger::open(config.ledger_dir()).unwrap());
    ledger.put_task(&task("task_001", "SLOW task", &head)).await.unwrap();
    ledger.put_task(&task("task_002", "fast task", &head)).await.unwrap();

    let report = stages::run_plans(&config, Arc::clone(&ledger), false)
        .await
        .unwrap();
    assert_eq!(report.complete, 1);
    assert_eq!(report.failed, 1);

    let slow = ledger.get_entry("task_001").await.unwrap().unwrap().plan.unwrap();
    assert_eq!(slow.status, RunStatus::Timeout);
    let fast = ledger.get_entry("task_002").await.unwrap().unwrap().plan.unwrap();
    assert_eq!(fast.status, RunStatus::Success);
}

#[tokio::test]
async fn rerun_without_force_is_a_byte_identical_noop() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), &["echo"], 30);
    let head = seed_repo(&config);

    let ledger: Arc<dyn TaskLedger> =
        Arc::new(FsTaskLedger::open(config.ledger_dir()).unwrap());
    ledger.put_task(&task("task_001", "prompt", &head)).await.unwrap();

    stages::run_plans(&config, Arc::clone(&ledger), false)
        .await
        .unwrap();
    let entry_path = config.ledger_dir().join("task_001.json");
    let before = std::fs::read(&entry_path).unwrap();

    let report = stages::run_plans(&config, Arc::clone(&ledger), false)
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.complete, 0);
    assert_eq!(std::fs::read(&entry_path).unwrap(), before);
}

#[tokio::test]
async fn unknown_start_commit_is_task_local() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), &["echo"], 30);
    let head = seed_repo(&config);

    let ledger: Arc<dyn TaskLedger> =
        Arc::new(FsTaskLedger::open(config.ledger_dir()).unwrap());
    let bogus = "0000000000000000000000000000000000000000";
    ledger.put_task(&task("task_001", "prompt", bogus)).await.unwrap();
    ledger.put_task(&task("task_002", "prompt", &head)).await.unwrap();

    let report = stages::run_plans(&config, Arc::clone(&ledger), false)
        .await
        .unwrap();
    assert_eq!(report.complete, 1);
    assert_eq!(report.failed, 1);
    let broken = ledger.get_entry("task_001").await.unwrap().unwrap().plan.unwrap();
    assert_eq!(broken.status, RunStatus::AgentError);
}

#[tokio::test]
async fn missing_tasks_fail_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().to_path_buf(), &["echo"], 30);
    let ledger: Arc<dyn TaskLedger> =
        Arc::new(FsTaskLedger::open(config.ledger_dir()).unwrap());
    let err = stages::run_plans(&config, ledger, false).await.unwrap_err();
    assert!(err.to_string().contains("generate-tasks"));
}
