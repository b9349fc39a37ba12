//! Per-task grading: runs the three dimensions and assembles the
//! `TaskScore`. Failures stay inside the task boundary; the grader never
//! panics and always returns a score record, even if it only says why
//! grading failed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use planeval_core::{
    EquivalenceContext, JudgeClient, MergeCommit, SearchClient,
};
use planeval_state::{
    GradingStatus, RunStatus, ScoreBreakdown, TaskEntry, TaskScore,
};

use crate::aggregate::{aggregate_score, DimensionOutcome};
use crate::claims::{decompose_with_retry, select_claims};
use crate::ground_truth::{extract_plan_files, recall_precision};
use crate::quality::{normalize_grade, score_quality};
use crate::verify::{ratio_verified, verify_claims};

pub struct Grader {
    judge: Arc<dyn JudgeClient>,
    search: Arc<dyn SearchClient>,
    max_claims: usize,
    repo_map: String,
    /// Recorded merge commits keyed by their parent sha, for equivalence
    /// context. Missing entries degrade to an empty context, not an error.
    merge_context: HashMap<String, MergeCommit>,
}

impl Grader {
    pub fn new(
        judge: Arc<dyn JudgeClient>,
        search: Arc<dyn SearchClient>,
        max_claims: usize,
        repo_map: String,
        merge_context: HashMap<String, MergeCommit>,
    ) -> Self {
        Self {
            judge,
            search,
            max_claims,
            repo_map,
            merge_context,
        }
    }

    /// Grade one task. A task without a usable plan is Failed outright;
    /// everything else produces per-dimension outcomes and an aggregate.
    pub async fn grade_task(&self, entry: &TaskEntry) -> TaskScore {
        let task_id = entry.task.task_id.clone();
        let plan = match &entry.plan {
            Some(plan) if plan.status == RunStatus::Success && !plan.text.trim().is_empty() => {
                plan
            }
            Some(plan) => {
                warn!(task_id, status = ?plan.status, "plan unusable, grading failed");
                return failed_score(&task_id, format!("plan run ended in {:?}", plan.status));
            }
            None => {
                warn!(task_id, "no plan recorded, grading failed");
                return failed_score(&task_id, "no plan recorded for task".to_string());
            }
        };

        let mut breakdown = ScoreBreakdown::default();
        let claim_verification = self
            .claim_verification_dimension(&plan.text, &mut breakdown)
            .await;
        let ground_truth_match = self
            .ground_truth_dimension(entry, &plan.text, &mut breakdown)
            .await;
        let quality = self.quality_dimension(&plan.text, &mut breakdown).await;

        let (dimensions, final_score, status, reason) =
            aggregate_score(&claim_verification, &ground_truth_match, &quality);
        info!(task_id, final_score, ?status, "task graded");
        TaskScore {
            task_id,
            dimensions,
            final_score,
            breakdown,
            status,
            reason,
            graded_at: Utc::now(),
        }
    }

    async fn claim_verification_dimension(
        &self,
        plan_text: &str,
        breakdown: &mut ScoreBreakdown,
    ) -> DimensionOutcome {
        let steps = match decompose_with_retry(self.judge.as_ref(), plan_text).await {
            Ok(steps) => steps,
            Err(err) => return DimensionOutcome::Failed(format!("decomposition failed: {err}")),
        };

        let claims = select_claims(&steps, self.max_claims);
        let checks = verify_claims(self.judge.as_ref(), self.search.as_ref(), &claims).await;
        let verdicts: Vec<_> = checks.iter().map(|c| c.verdict).collect();
        breakdown.claim_verdicts = verdicts.iter().map(|v| v.as_str().to_string()).collect();
        breakdown.claim_evidence = checks.into_iter().map(|c| c.evidence).collect();
        breakdown.ratio_verified = ratio_verified(&verdicts);

        let logic = match self
            .judge
            .judge_logic(plan_text, &steps, &self.repo_map)
            .await
        {
            Ok(grade) => normalize_grade(grade),
            Err(err) => {
                return DimensionOutcome::Failed(format!("soundness judgment failed: {err}"))
            }
        };
        breakdown.logical_soundness = logic;

        let value = match breakdown.ratio_verified {
            Some(ratio) => 0.5 * ratio + 0.5 * logic,
            // No claim resolved either way; soundness carries the dimension
            None => logic,
        };
        DimensionOutcome::Complete(value)
    }

    async fn ground_truth_dimension(
        &self,
        entry: &TaskEntry,
        plan_text: &str,
        breakdown: &mut ScoreBreakdown,
    ) -> DimensionOutcome {
        let ground_truth = &entry.task.ground_truth;
        if ground_truth.is_empty() {
            return DimensionOutcome::Skipped("no ground truth recorded".to_string());
        }

        let plan_files = extract_plan_files(plan_text);
        let (recall, precision) = recall_precision(&plan_files, &ground_truth.all_files());
        breakdown.file_recall = recall;
        breakdown.file_precision = precision;

        let merge = self.merge_context.get(&entry.task.repo_state_commit);
        let context = EquivalenceContext {
            task_prompt: &entry.task.prompt,
            ground_truth,
            plan_text,
            commit_message: merge.map(|m| m.message.as_str()).unwrap_or(""),
            diff_summary: merge.map(|m| m.diff.as_str()).unwrap_or(""),
        };
        let judge_score = match self.judge.judge_equivalence(&context).await {
            Ok(grade) => normalize_grade(grade),
            Err(err) => {
                return DimensionOutcome::Failed(format!("equivalence judgment failed: {err}"))
            }
        };
        breakdown.gt_judge = judge_score;

        DimensionOutcome::Complete(0.25 * recall + 0.25 * precision + 0.5 * judge_score)
    }

    async fn quality_dimension(
        &self,
        plan_text: &str,
        breakdown: &mut ScoreBreakdown,
    ) -> DimensionOutcome {
        match score_quality(self.judge.as_ref(), plan_text).await {
            Ok(scores) => {
                breakdown.conciseness = scores.conciseness;
                breakdown.precision = scores.precision;
                breakdown.tone = scores.tone;
                breakdown.formatting = scores.formatting;
                DimensionOutcome::Complete(scores.mean())
            }
            Err(err) => DimensionOutcome::Failed(format!("rubric call failed: {err}")),
        }
    }
}

fn failed_score(task_id: &str, reason: String) -> TaskScore {
    TaskScore {
        task_id: task_id.to_string(),
        dimensions: Vec::new(),
        final_score: 0.0,
        breakdown: ScoreBreakdown::default(),
        status: GradingStatus::Failed,
        reason: Some(reason),
        graded_at: Utc::now(),
    }
}
