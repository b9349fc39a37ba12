//! Planeval Core Library
//!
//! Shared domain logic for the plan-mode evaluation pipeline: configuration,
//! the external-error taxonomy and retry policy, the collaborator interfaces
//! (judge, search, planning agent, repository packager, version control) and
//! their production implementations, plus task generation from merge history.

pub mod agent;
pub mod config;
pub mod contextize;
pub mod error;
pub mod fakes;
pub mod git;
pub mod judge;
pub mod retry;
pub mod search;
pub mod taskgen;
pub mod telemetry;

pub use agent::{CliPlanAgent, PlanAgent, PlanOutcome};
pub use config::EvalConfig;
pub use contextize::{contextize_repo, load_repo_map};
pub use error::{ExternalError, GitError};
pub use fakes::{ScriptedAgent, ScriptedJudge, ScriptedSearch};
pub use git::{
    capture_head_sha, clone_or_fetch, commit_exists, extract_merge_commits, is_git_repo,
    repo_slug, MergeCommit, Worktree,
};
pub use judge::{
    ClaimVerdict, CommitKind, EquivalenceContext, HttpJudgeClient, JudgeClient, PlanStep,
    RubricScores,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use search::{BraveSearchClient, SearchClient, SearchHit};
pub use taskgen::{extract_ground_truth, generate_tasks, load_merge_commits_by_parent};
pub use telemetry::init_tracing;

/// Planeval version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
