//! Style rubric: one judge call, four 1-5 sub-scores, quality is their mean.

use planeval_core::{ExternalError, JudgeClient, RubricScores};

/// Normalized rubric values in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScores {
    pub conciseness: f64,
    pub precision: f64,
    pub tone: f64,
    pub formatting: f64,
}

impl QualityScores {
    pub fn mean(&self) -> f64 {
        (self.conciseness + self.precision + self.tone + self.formatting) / 4.0
    }
}

/// 1-5 judge scale onto [0, 1].
pub fn normalize_grade(grade: u8) -> f64 {
    (f64::from(grade.clamp(1, 5)) - 1.0) / 4.0
}

/// Score the plan's writing quality.
pub async fn score_quality(
    judge: &dyn JudgeClient,
    plan_text: &str,
) -> Result<QualityScores, ExternalError> {
    let RubricScores {
        conciseness,
        precision,
        tone,
        formatting,
    } = judge.judge_rubric(plan_text).await?;
    Ok(QualityScores {
        conciseness: normalize_grade(conciseness),
        precision: normalize_grade(precision),
        tone: normalize_grade(tone),
        formatting: normalize_grade(formatting),
    })
}
