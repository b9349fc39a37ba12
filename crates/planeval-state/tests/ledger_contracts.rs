//! Contract tests exercised against both ledger backends.

use std::sync::Arc;

use chrono::Utc;
use planeval_state::fakes::MemoryTaskLedger;
use planeval_state::{
    Difficulty, FsTaskLedger, GradingStatus, GroundTruth, LedgerError, PlanDocument, RunStatus,
    ScoreBreakdown, TaskLedger, TaskObject, TaskScore, TaskType,
};

fn sample_task(id: &str) -> TaskObject {
    TaskObject {
        task_id: id.to_string(),
        prompt: "Add a retry mechanism to the login flow".to_string(),
        repo_state_commit: "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".to_string(),
        ground_truth: GroundTruth {
            files_modified: ["src/auth/login.ts".to_string()].into(),
            ..Default::default()
        },
        difficulty: Difficulty::Medium,
        task_type: TaskType::BugFix,
    }
}

fn sample_plan(id: &str) -> PlanDocument {
    PlanDocument {
        task_id: id.to_string(),
        text: "## Plan\n1. Edit `src/auth/login.ts`".to_string(),
        generated_at: Utc::now(),
        status: RunStatus::Success,
    }
}

fn sample_score(id: &str) -> TaskScore {
    TaskScore {
        task_id: id.to_string(),
        dimensions: vec![],
        final_score: 72.5,
        breakdown: ScoreBreakdown::default(),
        status: GradingStatus::Complete,
        reason: None,
        graded_at: Utc::now(),
    }
}

async fn exercise_contract(ledger: Arc<dyn TaskLedger>) {
    // Empty ledger probes
    assert!(!ledger.has_tasks().await.unwrap());
    assert!(!ledger.has_plans().await.unwrap());

    // Task round trip
    ledger.put_task(&sample_task("task_001")).await.unwrap();
    ledger.put_task(&sample_task("task_002")).await.unwrap();
    let tasks = ledger.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].task_id, "task_001");
    assert!(ledger.has_tasks().await.unwrap());

    // Plans only exist once attached to every task
    ledger
        .put_plan("task_001", &sample_plan("task_001"))
        .await
        .unwrap();
    assert!(!ledger.has_plans().await.unwrap());
    ledger
        .put_plan("task_002", &sample_plan("task_002"))
        .await
        .unwrap();
    assert!(ledger.has_plans().await.unwrap());

    // Scores use overwrite semantics
    ledger
        .put_score("task_001", &sample_score("task_001"))
        .await
        .unwrap();
    let mut replacement = sample_score("task_001");
    replacement.final_score = 10.0;
    ledger.put_score("task_001", &replacement).await.unwrap();
    let entry = ledger.get_entry("task_001").await.unwrap().unwrap();
    assert_eq!(entry.score.unwrap().final_score, 10.0);

    // Plan for an unknown task is rejected
    let err = ledger
        .put_plan("task_404", &sample_plan("task_404"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::TaskNotFound(_)));

    // Re-putting an unchanged definition keeps the derived artifacts
    ledger.put_task(&sample_task("task_001")).await.unwrap();
    let entry = ledger.get_entry("task_001").await.unwrap().unwrap();
    assert!(entry.plan.is_some());
    assert!(entry.score.is_some());

    // A changed definition invalidates them: the old plan and score were
    // produced for a different task
    let mut regenerated = sample_task("task_001");
    regenerated.repo_state_commit = "cafebabecafebabecafebabecafebabecafebabe".to_string();
    ledger.put_task(&regenerated).await.unwrap();
    let entry = ledger.get_entry("task_001").await.unwrap().unwrap();
    assert_eq!(entry.task.repo_state_commit, regenerated.repo_state_commit);
    assert!(entry.plan.is_none());
    assert!(entry.score.is_none());
}

#[tokio::test]
async fn memory_ledger_satisfies_contract() {
    exercise_contract(Arc::new(MemoryTaskLedger::new())).await;
}

#[tokio::test]
async fn fs_ledger_satisfies_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise_contract(Arc::new(FsTaskLedger::open(dir.path()).unwrap())).await;
}

#[tokio::test]
async fn fs_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let ledger = FsTaskLedger::open(dir.path()).unwrap();
        ledger.put_task(&sample_task("task_001")).await.unwrap();
        ledger
            .put_plan("task_001", &sample_plan("task_001"))
            .await
            .unwrap();
    }

    // Simulated restart: a fresh handle sees the persisted entry.
    let reopened = FsTaskLedger::open(dir.path()).unwrap();
    let entry = reopened.get_entry("task_001").await.unwrap().unwrap();
    assert_eq!(entry.task.task_id, "task_001");
    assert!(entry.plan.is_some());
    assert!(entry.score.is_none());
}

#[tokio::test]
async fn fs_ledger_rewrite_of_same_entry_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = FsTaskLedger::open(dir.path()).unwrap();

    let task = sample_task("task_001");
    ledger.put_task(&task).await.unwrap();
    let path = dir.path().join("task_001.json");
    let first = std::fs::read(&path).unwrap();

    ledger.put_task(&task).await.unwrap();
    let second = std::fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn fs_ledger_leaves_no_temp_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = FsTaskLedger::open(dir.path()).unwrap();
    ledger.put_task(&sample_task("task_001")).await.unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
