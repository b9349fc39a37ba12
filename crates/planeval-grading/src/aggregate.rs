//! Score aggregation: a pure function from dimension outcomes to the final
//! 0-100 score and grading status.

use planeval_state::{Dimension, DimensionScore, GradingStatus};

/// How one dimension ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionOutcome {
    /// Value in [0, 1].
    Complete(f64),
    /// The dimension could not apply to this task (e.g. empty ground truth).
    Skipped(String),
    /// The dimension's computation failed.
    Failed(String),
}

impl DimensionOutcome {
    fn value(&self) -> f64 {
        match self {
            DimensionOutcome::Complete(v) => v.clamp(0.0, 1.0),
            // A missing dimension contributes nothing rather than inventing
            // a neutral value.
            DimensionOutcome::Skipped(_) | DimensionOutcome::Failed(_) => 0.0,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            DimensionOutcome::Complete(_) => None,
            DimensionOutcome::Skipped(reason) | DimensionOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Combine the three dimension outcomes into dimension scores, a final score
/// in [0, 100], and the grading status. Any Skipped or Failed dimension
/// forces `Partial` with its reasons joined; a partial score is never
/// presented as Complete.
pub fn aggregate_score(
    claim_verification: &DimensionOutcome,
    ground_truth_match: &DimensionOutcome,
    quality: &DimensionOutcome,
) -> (Vec<DimensionScore>, f64, GradingStatus, Option<String>) {
    let outcomes = [
        (Dimension::ClaimVerification, claim_verification),
        (Dimension::GroundTruthMatch, ground_truth_match),
        (Dimension::Quality, quality),
    ];

    let mut dimensions = Vec::with_capacity(outcomes.len());
    let mut final_score = 0.0;
    let mut reasons = Vec::new();
    for (dimension, outcome) in outcomes {
        let value = outcome.value();
        final_score += dimension.weight() * value;
        dimensions.push(DimensionScore {
            dimension,
            value,
            weight: dimension.weight(),
        });
        if let Some(reason) = outcome.reason() {
            reasons.push(format!("{dimension:?}: {reason}"));
        }
    }
    final_score *= 100.0;

    if reasons.is_empty() {
        (dimensions, final_score, GradingStatus::Complete, None)
    } else {
        (
            dimensions,
            final_score,
            GradingStatus::Partial,
            Some(reasons.join("; ")),
        )
    }
}

/// Round half-up to two decimals. Display only; stored scores stay raw.
pub fn round_display(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}
