//! Stage orchestration.
//!
//! Four stages, strictly ordered by data dependency:
//! contextize → generate-tasks → run-plans → grade.
//!
//! Each stage checks its upstream artifact, is a no-op when its own output
//! already exists (unless forced), and processes tasks independently: one
//! task failing never halts its siblings. A stage itself fails only when it
//! cannot produce any output at all.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use planeval_core::{
    commit_exists, contextize_repo, generate_tasks, load_merge_commits_by_parent, load_repo_map,
    BraveSearchClient, CliPlanAgent, EvalConfig, HttpJudgeClient, PlanAgent, Worktree,
};
use planeval_grading::{round_display, Grader};
use planeval_state::{
    GradingStatus, PlanDocument, RunStatus, TaskEntry, TaskLedger,
};

/// Per-task tallies for one stage run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StageReport {
    pub fn print_summary(&self, stage: &str) {
        println!(
            "{stage}: {} complete, {} partial, {} failed, {} skipped",
            self.complete, self.partial, self.failed, self.skipped
        );
    }
}

/// Clone the repository and build the repo map.
pub async fn run_contextize(config: &EvalConfig, force: bool) -> Result<StageReport> {
    if config.repo_map_path().exists() && !force {
        info!(path = %config.repo_map_path().display(), "repo map exists, skipping (use --force to rebuild)");
        return Ok(StageReport {
            skipped: 1,
            ..Default::default()
        });
    }
    let config = config.clone();
    // The clone and the packager are long-running subprocesses
    let path = tokio::task::spawn_blocking(move || contextize_repo(&config)).await??;
    println!("repo map written to {}", path.display());
    Ok(StageReport {
        complete: 1,
        ..Default::default()
    })
}

/// Synthesize tasks from merge history into the ledger.
pub async fn run_generate_tasks(
    config: &EvalConfig,
    ledger: Arc<dyn TaskLedger>,
    force: bool,
) -> Result<StageReport> {
    if !config.repo_map_path().exists() {
        bail!("repo map missing; run `planeval contextize` first");
    }
    if ledger.has_tasks().await? && !force {
        info!("ledger already has tasks, skipping (use --force to regenerate)");
        return Ok(StageReport {
            skipped: 1,
            ..Default::default()
        });
    }
    let judge = HttpJudgeClient::new(config).context("judge client unavailable")?;
    let generated = generate_tasks(config, &judge, ledger.as_ref()).await?;
    if generated == 0 {
        bail!("no tasks could be generated from the merge history");
    }
    println!("generated {generated} tasks");
    Ok(StageReport {
        complete: generated,
        ..Default::default()
    })
}

/// Run the planning agent for every task that does not yet have a plan.
pub async fn run_plans(
    config: &EvalConfig,
    ledger: Arc<dyn TaskLedger>,
    force: bool,
) -> Result<StageReport> {
    if !ledger.has_tasks().await? {
        bail!("ledger has no tasks; run `planeval generate-tasks` first");
    }
    if ledger.has_plans().await? && !force {
        info!("every task already has a plan, skipping (use --force to re-run)");
        return Ok(StageReport {
            skipped: 1,
            ..Default::default()
        });
    }

    let agent: Arc<dyn PlanAgent> = Arc::new(CliPlanAgent::new(config)?);
    let entries = ledger.list_entries().await?;
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let mut report = StageReport::default();

    for entry in entries {
        if entry.plan.is_some() && !force {
            report.skipped += 1;
            continue;
        }
        let agent = Arc::clone(&agent);
        let ledger = Arc::clone(&ledger);
        let semaphore = Arc::clone(&semaphore);
        let repo_dir = config.repo_dir();
        let worktree_path = config.worktrees_dir().join(&entry.task.task_id);
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (entry.task.task_id, None);
            };
            let task_id = entry.task.task_id.clone();
            let status = plan_one_task(&*agent, &*ledger, &entry, &repo_dir, &worktree_path).await;
            (task_id, status)
        });
    }

    let mut writes = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let Ok((task_id, status)) = joined else {
            report.failed += 1;
            continue;
        };
        match status {
            Some(RunStatus::Success) => {
                println!("{task_id}: plan captured");
                report.complete += 1;
                writes += 1;
            }
            Some(RunStatus::Timeout) => {
                println!("{task_id}: agent timed out");
                report.failed += 1;
                writes += 1;
            }
            Some(RunStatus::AgentError) => {
                println!("{task_id}: agent failed");
                report.failed += 1;
                writes += 1;
            }
            None => {
                println!("{task_id}: could not record an outcome");
                report.failed += 1;
            }
        }
    }

    // Failed runs still count: their PlanDocument landed in the ledger.
    // The stage itself fails only when nothing could be recorded at all.
    if writes == 0 && report.skipped == 0 {
        bail!("no plan outcome could be recorded");
    }
    Ok(report)
}

/// Run the agent in a detached worktree at the task's start commit and
/// record the outcome. Every failure mode still writes a `PlanDocument` so
/// grading can report it; `None` means even that write failed.
async fn plan_one_task(
    agent: &dyn PlanAgent,
    ledger: &dyn TaskLedger,
    entry: &TaskEntry,
    repo_dir: &std::path::Path,
    worktree_path: &std::path::Path,
) -> Option<RunStatus> {
    let task = &entry.task;
    let outcome = if !commit_exists(repo_dir, &task.repo_state_commit) {
        warn!(
            task_id = task.task_id,
            commit = task.repo_state_commit,
            "start commit not found in clone"
        );
        None
    } else {
        match Worktree::add(repo_dir, &task.repo_state_commit, worktree_path) {
            Ok(worktree) => match agent.run_plan(&task.prompt, worktree.path()).await {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    warn!(task_id = task.task_id, error = %err, "agent invocation failed");
                    None
                }
            },
            Err(err) => {
                warn!(task_id = task.task_id, error = %err, "worktree setup failed");
                None
            }
        }
    };

    let (status, text) = match outcome {
        Some(outcome) => (outcome.status, outcome.text),
        None => (RunStatus::AgentError, String::new()),
    };
    let plan = PlanDocument {
        task_id: task.task_id.clone(),
        text,
        generated_at: Utc::now(),
        status,
    };
    if let Err(err) = ledger.put_plan(&task.task_id, &plan).await {
        warn!(task_id = task.task_id, error = %err, "failed to record plan");
        return None;
    }
    Some(status)
}

/// Grade every task that has a plan but no score yet.
pub async fn run_grade(
    config: &EvalConfig,
    ledger: Arc<dyn TaskLedger>,
    force: bool,
) -> Result<StageReport> {
    if !ledger.has_plans().await? {
        bail!("tasks are missing plans; run `planeval run-plans` first");
    }
    if ledger.has_scores().await? && !force {
        info!("every task already has a score, skipping (use --force to regrade)");
        return Ok(StageReport {
            skipped: 1,
            ..Default::default()
        });
    }

    let judge = Arc::new(HttpJudgeClient::new(config).context("judge client unavailable")?);
    let search = Arc::new(BraveSearchClient::new(config).context("search client unavailable")?);
    let repo_map = load_repo_map(config)?;
    let merge_context: HashMap<_, _> = load_merge_commits_by_parent(config)?;
    let grader = Arc::new(Grader::new(
        judge,
        search,
        config.max_claims_per_task,
        repo_map,
        merge_context,
    ));

    let entries = ledger.list_entries().await?;
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let mut report = StageReport::default();

    for entry in entries {
        if entry.score.is_some() && !force {
            report.skipped += 1;
            continue;
        }
        let grader = Arc::clone(&grader);
        let ledger = Arc::clone(&ledger);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return None;
            };
            let score = grader.grade_task(&entry).await;
            if let Err(err) = ledger.put_score(&score.task_id, &score).await {
                warn!(task_id = entry.task.task_id, error = %err, "failed to record score");
                return None;
            }
            Some(score)
        });
    }

    let mut writes = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let Ok(Some(score)) = joined else {
            report.failed += 1;
            continue;
        };
        writes += 1;
        match score.status {
            GradingStatus::Complete => {
                println!(
                    "{}: {:.2} (complete)",
                    score.task_id,
                    round_display(score.final_score)
                );
                report.complete += 1;
            }
            GradingStatus::Partial => {
                println!(
                    "{}: {:.2} (partial: {})",
                    score.task_id,
                    round_display(score.final_score),
                    score.reason.as_deref().unwrap_or("unspecified")
                );
                report.partial += 1;
            }
            GradingStatus::Failed => {
                println!(
                    "{}: failed ({})",
                    score.task_id,
                    score.reason.as_deref().unwrap_or("unspecified")
                );
                report.failed += 1;
            }
        }
    }

    // A Failed grade is still a ledger write; only a stage that recorded
    // nothing at all is itself Failed.
    if writes == 0 && report.skipped == 0 {
        bail!("grading recorded no scores");
    }
    Ok(report)
}
