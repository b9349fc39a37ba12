//! Planeval State - durable task ledger (Layer 0)
//!
//! Persists evaluation tasks and their derived artifacts (plans, scores),
//! keyed by task id, so any pipeline stage can resume from the last
//! persisted state after a restart.
//!
//! Backends:
//! - `FsTaskLedger`: one JSON file per task, atomic temp-then-rename writes
//! - `fakes::MemoryTaskLedger`: in-memory fake for tests

pub mod error;
pub mod fakes;
pub mod fs_ledger;
pub mod ledger_traits;
pub mod records;

pub use error::LedgerError;
pub use fs_ledger::FsTaskLedger;
pub use ledger_traits::{LedgerResult, TaskLedger};
pub use records::{
    Difficulty, Dimension, DimensionScore, GradingStatus, GroundTruth, PlanDocument, RunStatus,
    ScoreBreakdown, TaskEntry, TaskObject, TaskScore, TaskType,
};
