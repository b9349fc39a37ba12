//! In-memory fake for the ledger trait (testing only)
//!
//! `MemoryTaskLedger` satisfies the `TaskLedger` contract without touching
//! the filesystem.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger_traits::{LedgerResult, TaskLedger};
use crate::records::{PlanDocument, TaskEntry, TaskObject, TaskScore};

/// In-memory ledger backed by a `BTreeMap<task_id, TaskEntry>`.
#[derive(Debug, Default)]
pub struct MemoryTaskLedger {
    entries: Mutex<BTreeMap<String, TaskEntry>>,
}

impl MemoryTaskLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskLedger for MemoryTaskLedger {
    async fn put_task(&self, task: &TaskObject) -> LedgerResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(task.task_id.clone())
            .and_modify(|e| {
                // A changed definition invalidates the derived artifacts
                if e.task != *task {
                    *e = TaskEntry::new(task.clone());
                }
            })
            .or_insert_with(|| TaskEntry::new(task.clone()));
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> LedgerResult<Option<TaskObject>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(task_id).map(|e| e.task.clone()))
    }

    async fn list_tasks(&self) -> LedgerResult<Vec<TaskObject>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.values().map(|e| e.task.clone()).collect())
    }

    async fn put_plan(&self, task_id: &str, plan: &PlanDocument) -> LedgerResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(task_id)
            .ok_or_else(|| LedgerError::TaskNotFound(task_id.to_string()))?;
        entry.plan = Some(plan.clone());
        Ok(())
    }

    async fn put_score(&self, task_id: &str, score: &TaskScore) -> LedgerResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(task_id)
            .ok_or_else(|| LedgerError::TaskNotFound(task_id.to_string()))?;
        entry.score = Some(score.clone());
        Ok(())
    }

    async fn get_entry(&self, task_id: &str) -> LedgerResult<Option<TaskEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(task_id).cloned())
    }

    async fn list_entries(&self) -> LedgerResult<Vec<TaskEntry>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.values().cloned().collect())
    }
}
