//! Persisted record types for the evaluation pipeline.
//!
//! One `TaskEntry` per task id holds the task definition plus its derived
//! artifacts (plan, score). Tasks are immutable once generated; plans are
//! overwritten only on explicit re-run; a re-grade replaces the prior score.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estimated difficulty of a task, as judged at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Kind of change the source merge commit represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    FeatureRequest,
    BugFix,
    CodeRefactoring,
}

impl TaskType {
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::FeatureRequest => "feature_request",
            TaskType::BugFix => "bug_fix",
            TaskType::CodeRefactoring => "code_refactoring",
        }
    }
}

/// Recorded file changes and additions of the historical fix for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Paths modified by the merge (relative to repository root).
    pub files_modified: BTreeSet<String>,

    /// Paths created by the merge.
    pub files_created: BTreeSet<String>,

    /// Short descriptions of the notable additions, in order.
    pub key_additions: Vec<String>,

    /// Package names added to a dependency manifest.
    pub libraries_added: BTreeSet<String>,
}

impl GroundTruth {
    /// Union of modified and created paths.
    pub fn all_files(&self) -> BTreeSet<String> {
        self.files_modified
            .union(&self.files_created)
            .cloned()
            .collect()
    }

    /// A ground truth with no recorded files or additions cannot be graded
    /// against; the ground-truth dimension is skipped for such tasks.
    pub fn is_empty(&self) -> bool {
        self.files_modified.is_empty()
            && self.files_created.is_empty()
            && self.key_additions.is_empty()
            && self.libraries_added.is_empty()
    }
}

/// One evaluation unit, synthesized from a merge commit.
///
/// Immutable after generation. `repo_state_commit` is the revision the agent
/// under evaluation must start from (the merge's first parent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskObject {
    /// Unique, stable identifier within a run (e.g. "task_007").
    pub task_id: String,

    /// The reverse-engineered user prompt.
    pub prompt: String,

    /// Commit the repository is checked out at before planning.
    pub repo_state_commit: String,

    /// What the historical fix actually changed.
    pub ground_truth: GroundTruth,

    pub difficulty: Difficulty,

    pub task_type: TaskType,
}

/// Outcome of invoking the planning agent for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Timeout,
    AgentError,
}

/// The agent's free-text plan output for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub task_id: String,

    /// Raw markdown text of the plan (empty on agent failure).
    pub text: String,

    pub generated_at: DateTime<Utc>,

    pub status: RunStatus,
}

/// One of the three top-level graded aspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    ClaimVerification,
    GroundTruthMatch,
    Quality,
}

impl Dimension {
    /// Fixed weight of this dimension in the final score. Weights sum to 1.
    pub fn weight(&self) -> f64 {
        match self {
            Dimension::ClaimVerification => 0.4,
            Dimension::GroundTruthMatch => 0.4,
            Dimension::Quality => 0.2,
        }
    }
}

/// A named sub-score with its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,

    /// Raw value in [0, 1].
    pub value: f64,

    pub weight: f64,
}

/// Whether a grading pass produced a full, partial, or no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingStatus {
    Complete,
    Partial,
    Failed,
}

/// Per-metric breakdown behind a final score.
///
/// The final score must be deterministically recomputable from these fields
/// alone, given the fixed dimension weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Verified / (Verified + Hallucination) over examined claims.
    /// `None` when no claim resolved to a definite verdict.
    pub ratio_verified: Option<f64>,

    /// Step-ordering / precondition consistency, normalized to [0, 1].
    pub logical_soundness: f64,

    pub file_recall: f64,
    pub file_precision: f64,

    /// Judged goal equivalence against the ground truth, normalized.
    pub gt_judge: f64,

    pub conciseness: f64,
    pub precision: f64,
    pub tone: f64,
    pub formatting: f64,

    /// Per-claim verdicts in examination order, kept for audit.
    pub claim_verdicts: Vec<String>,

    /// Search evidence shown to the judge per claim, aligned with
    /// `claim_verdicts`; empty for claims that were never judged.
    #[serde(default)]
    pub claim_evidence: Vec<String>,
}

/// Final grading record for one task. Overwrite semantics: a re-run replaces
/// the prior score for the same task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskScore {
    pub task_id: String,

    pub dimensions: Vec<DimensionScore>,

    /// Weighted total in [0, 100].
    pub final_score: f64,

    pub breakdown: ScoreBreakdown,

    pub status: GradingStatus,

    /// Why the score is Partial or Failed, if it is.
    pub reason: Option<String>,

    pub graded_at: DateTime<Utc>,
}

/// Everything the ledger stores for one task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task: TaskObject,
    pub plan: Option<PlanDocument>,
    pub score: Option<TaskScore>,
}

impl TaskEntry {
    pub fn new(task: TaskObject) -> Self {
        Self {
            task,
            plan: None,
            score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_truth_all_files_unions_modified_and_created() {
        let gt = GroundTruth {
            files_modified: ["a.py".to_string()].into(),
            files_created: ["b.py".to_string()].into(),
            ..Default::default()
        };
        let all = gt.all_files();
        assert!(all.contains("a.py"));
        assert!(all.contains("b.py"));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn ground_truth_empty_detection() {
        assert!(GroundTruth::default().is_empty());

        let gt = GroundTruth {
            key_additions: vec!["retry logic".to_string()],
            ..Default::default()
        };
        assert!(!gt.is_empty());
    }

    #[test]
    fn dimension_weights_sum_to_one() {
        let total = Dimension::ClaimVerification.weight()
            + Dimension::GroundTruthMatch.weight()
            + Dimension::Quality.weight();
        assert!((total - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn task_entry_round_trips_through_json() {
        let entry = TaskEntry::new(TaskObject {
            task_id: "task_001".to_string(),
            prompt: "Add retry logic to login".to_string(),
            repo_state_commit: "abc123".to_string(),
            ground_truth: GroundTruth::default(),
            difficulty: Difficulty::Medium,
            task_type: TaskType::BugFix,
        });

        let json = serde_json::to_string(&entry).unwrap();
        let back: TaskEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
