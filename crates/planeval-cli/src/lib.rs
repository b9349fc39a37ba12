//! Stage orchestration behind the `planeval` binary, exposed as a library
//! so the stage flow can be driven directly in tests.

pub mod stages;

pub use stages::{run_contextize, run_generate_tasks, run_grade, run_plans, StageReport};
