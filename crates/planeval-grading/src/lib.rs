//! Planeval Grading Engine
//!
//! Turns a task's plan into a `TaskScore` along three dimensions: claim
//! verification (are the plan's factual claims real), ground-truth match
//! (does the plan touch what the historical fix touched), and writing
//! quality. The aggregation into a final 0-100 score is a pure function
//! over the dimension outcomes.

pub mod aggregate;
pub mod claims;
pub mod grader;
pub mod ground_truth;
pub mod quality;
pub mod verify;

pub use aggregate::{aggregate_score, round_display, DimensionOutcome};
pub use claims::{decompose_with_retry, select_claims, Claim};
pub use grader::Grader;
pub use ground_truth::{extract_plan_files, normalize_path, recall_precision};
pub use quality::{normalize_grade, score_quality, QualityScores};
pub use verify::{ratio_verified, verify_claims, ClaimCheck};
