//! Ledger trait definition.
//!
//! The ledger is the durable per-task record store that makes the pipeline
//! resumable: `generate-tasks` writes task definitions, `run-plans` attaches
//! plan documents, `grade` attaches scores. In-memory fakes are provided for
//! testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::records::{PlanDocument, TaskEntry, TaskObject, TaskScore};

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Durable, append-friendly record of task definitions and derived artifacts.
///
/// Guarantees:
/// - Entries are keyed by unique task id.
/// - Writes are atomic per task: readers never observe a half-written entry.
/// - `put_plan` and `put_score` overwrite any prior artifact for the task.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Insert or replace a task definition. Creates the entry if absent.
    async fn put_task(&self, task: &TaskObject) -> LedgerResult<()>;

    /// Fetch a task definition, if it exists.
    async fn get_task(&self, task_id: &str) -> LedgerResult<Option<TaskObject>>;

    /// All task definitions, ordered by task id.
    async fn list_tasks(&self) -> LedgerResult<Vec<TaskObject>>;

    /// Attach a plan document to an existing task.
    /// Fails with `TaskNotFound` if the task was never generated.
    async fn put_plan(&self, task_id: &str, plan: &PlanDocument) -> LedgerResult<()>;

    /// Attach a grading record to an existing task (overwrite semantics).
    async fn put_score(&self, task_id: &str, score: &TaskScore) -> LedgerResult<()>;

    /// Fetch the full entry for a task id.
    async fn get_entry(&self, task_id: &str) -> LedgerResult<Option<TaskEntry>>;

    /// All entries, ordered by task id.
    async fn list_entries(&self) -> LedgerResult<Vec<TaskEntry>>;

    /// Whether any task definitions exist (generate-tasks artifact probe).
    async fn has_tasks(&self) -> LedgerResult<bool> {
        Ok(!self.list_tasks().await?.is_empty())
    }

    /// Whether every task has a plan attached (run-plans artifact probe).
    async fn has_plans(&self) -> LedgerResult<bool> {
        let entries = self.list_entries().await?;
        Ok(!entries.is_empty() && entries.iter().all(|e| e.plan.is_some()))
    }

    /// Whether every task has a score attached (grade artifact probe).
    async fn has_scores(&self) -> LedgerResult<bool> {
        let entries = self.list_entries().await?;
        Ok(!entries.is_empty() && entries.iter().all(|e| e.score.is_some()))
    }
}
