//! Plan decomposition and claim selection.

use planeval_core::{ExternalError, JudgeClient, PlanStep};
use tracing::warn;

/// One verifiable claim, tagged with the step it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// 0-based index of the step the claim appeared in.
    pub step_index: usize,
    pub text: String,
}

/// Decompose a plan into steps, retrying once with a stricter formatting
/// instruction when the judge's output fails to parse. A second schema
/// violation fails the whole verification phase; a partial claim list is
/// not trustworthy enough to score.
pub async fn decompose_with_retry(
    judge: &dyn JudgeClient,
    plan_text: &str,
) -> Result<Vec<PlanStep>, ExternalError> {
    match judge.decompose_plan(plan_text, false).await {
        Ok(steps) => Ok(steps),
        Err(ExternalError::SchemaViolation(first)) => {
            warn!(error = %first, "decomposition output malformed, retrying strictly");
            judge.decompose_plan(plan_text, true).await
        }
        Err(err) => Err(err),
    }
}

/// Bound verification to the earliest `max_claims` claims in plan order.
/// Deterministic: repeated runs over the same plan examine the same subset.
pub fn select_claims(steps: &[PlanStep], max_claims: usize) -> Vec<Claim> {
    let mut claims = Vec::new();
    for (step_index, step) in steps.iter().enumerate() {
        for claim in &step.claims {
            if claims.len() >= max_claims {
                return claims;
            }
            let text = claim.trim();
            if text.is_empty() {
                continue;
            }
            claims.push(Claim {
                step_index,
                text: text.to_string(),
            });
        }
    }
    claims
}
