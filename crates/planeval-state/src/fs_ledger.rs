//! Filesystem-backed task ledger.
//!
//! Layout: one `<task_id>.json` file per task under the ledger root, each
//! holding the full serialized `TaskEntry`. Every write goes to
//! `<task_id>.json.tmp` first and is renamed over the target, so an
//! interrupted process leaves the prior entry intact rather than a
//! half-written record. A mutex serializes writers; reads go straight to
//! disk, which is what makes the pipeline resumable across restarts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger_traits::{LedgerResult, TaskLedger};
use crate::records::{PlanDocument, TaskEntry, TaskObject, TaskScore};

/// Task ledger rooted at a directory of per-task JSON files.
pub struct FsTaskLedger {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsTaskLedger {
    /// Open (creating if needed) a ledger rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> LedgerResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| LedgerError::Io {
            path: root.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the per-task entry files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, task_id: &str) -> PathBuf {
        self.root.join(format!("{task_id}.json"))
    }

    fn read_entry(&self, task_id: &str) -> LedgerResult<Option<TaskEntry>> {
        let path = self.entry_path(task_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LedgerError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let entry: TaskEntry = serde_json::from_str(&content)?;
        Ok(Some(entry))
    }

    /// Serialize `entry`, write it to a sibling temp file, rename into place.
    fn write_entry(&self, entry: &TaskEntry) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        let path = self.entry_path(&entry.task.task_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(entry)?;
        fs::write(&tmp, json).map_err(|e| LedgerError::Io {
            path: tmp.display().to_string(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| LedgerError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        debug!(task_id = %entry.task.task_id, path = %path.display(), "ledger entry written");
        Ok(())
    }

    fn task_ids(&self) -> LedgerResult<Vec<String>> {
        let mut ids = Vec::new();
        let dir = fs::read_dir(&self.root).map_err(|e| LedgerError::Io {
            path: self.root.display().to_string(),
            source: e,
        })?;
        for item in dir {
            let item = item.map_err(|e| LedgerError::Io {
                path: self.root.display().to_string(),
                source: e,
            })?;
            let name = item.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl TaskLedger for FsTaskLedger {
    async fn put_task(&self, task: &TaskObject) -> LedgerResult<()> {
        // An unchanged definition keeps its artifacts; a changed one drops
        // them, since the old plan and score were produced for a different
        // task and would otherwise be reported against the new one.
        let entry = match self.read_entry(&task.task_id)? {
            Some(existing) if existing.task == *task => existing,
            _ => TaskEntry::new(task.clone()),
        };
        self.write_entry(&entry)
    }

    async fn get_task(&self, task_id: &str) -> LedgerResult<Option<TaskObject>> {
        Ok(self.read_entry(task_id)?.map(|e| e.task))
    }

    async fn list_tasks(&self) -> LedgerResult<Vec<TaskObject>> {
        Ok(self.list_entries().await?.into_iter().map(|e| e.task).collect())
    }

    async fn put_plan(&self, task_id: &str, plan: &PlanDocument) -> LedgerResult<()> {
        let mut entry = self
            .read_entry(task_id)?
            .ok_or_else(|| LedgerError::TaskNotFound(task_id.to_string()))?;
        entry.plan = Some(plan.clone());
        self.write_entry(&entry)
    }

    async fn put_score(&self, task_id: &str, score: &TaskScore) -> LedgerResult<()> {
        let mut entry = self
            .read_entry(task_id)?
            .ok_or_else(|| LedgerError::TaskNotFound(task_id.to_string()))?;
        entry.score = Some(score.clone());
        self.write_entry(&entry)
    }

    async fn get_entry(&self, task_id: &str) -> LedgerResult<Option<TaskEntry>> {
        self.read_entry(task_id)
    }

    async fn list_entries(&self) -> LedgerResult<Vec<TaskEntry>> {
        let mut entries = Vec::new();
        for id in self.task_ids()? {
            if let Some(entry) = self.read_entry(&id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
