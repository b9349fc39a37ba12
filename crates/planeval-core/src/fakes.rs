//! Scripted collaborator doubles for tests.
//!
//! Each fake replays a queue of canned responses and counts its calls, so a
//! test can both drive a scenario (quota exhaustion mid-verification, a
//! schema violation on the first decompose) and assert on how the code under
//! test reacted.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use planeval_state::{Difficulty, RunStatus};

use crate::agent::{PlanAgent, PlanOutcome};
use crate::error::ExternalError;
use crate::judge::{
    ClaimVerdict, CommitKind, EquivalenceContext, JudgeClient, PlanStep, RubricScores,
};
use crate::search::{SearchClient, SearchHit};

/// Judge whose every answer is scripted in advance.
///
/// Queues are consumed front-to-back; an exhausted queue falls back to a
/// benign default so tests only script the calls they care about.
#[derive(Default)]
pub struct ScriptedJudge {
    decompose: Mutex<VecDeque<Result<Vec<PlanStep>, ExternalError>>>,
    verdicts: Mutex<VecDeque<Result<ClaimVerdict, ExternalError>>>,
    logic: Mutex<VecDeque<Result<u8, ExternalError>>>,
    equivalence: Mutex<VecDeque<Result<u8, ExternalError>>>,
    rubric: Mutex<VecDeque<Result<RubricScores, ExternalError>>>,
    kinds: Mutex<VecDeque<Result<CommitKind, ExternalError>>>,
    prompts: Mutex<VecDeque<Result<(String, Difficulty), ExternalError>>>,

    pub decompose_calls: AtomicUsize,
    pub strict_decompose_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_decompose(&self, result: Result<Vec<PlanStep>, ExternalError>) {
        self.decompose.lock().unwrap().push_back(result);
    }

    pub fn push_verdict(&self, result: Result<ClaimVerdict, ExternalError>) {
        self.verdicts.lock().unwrap().push_back(result);
    }

    pub fn push_logic(&self, result: Result<u8, ExternalError>) {
        self.logic.lock().unwrap().push_back(result);
    }

    pub fn push_equivalence(&self, result: Result<u8, ExternalError>) {
        self.equivalence.lock().unwrap().push_back(result);
    }

    pub fn push_rubric(&self, result: Result<RubricScores, ExternalError>) {
        self.rubric.lock().unwrap().push_back(result);
    }

    pub fn push_kind(&self, result: Result<CommitKind, ExternalError>) {
        self.kinds.lock().unwrap().push_back(result);
    }

    pub fn push_prompt(&self, result: Result<(String, Difficulty), ExternalError>) {
        self.prompts.lock().unwrap().push_back(result);
    }
}

fn pop_or<T>(
    queue: &Mutex<VecDeque<Result<T, ExternalError>>>,
    default: T,
) -> Result<T, ExternalError> {
    queue.lock().unwrap().pop_front().unwrap_or(Ok(default))
}

#[async_trait]
impl JudgeClient for ScriptedJudge {
    async fn decompose_plan(
        &self,
        _plan_text: &str,
        strict: bool,
    ) -> Result<Vec<PlanStep>, ExternalError> {
        self.decompose_calls.fetch_add(1, Ordering::SeqCst);
        if strict {
            self.strict_decompose_calls.fetch_add(1, Ordering::SeqCst);
        }
        pop_or(&self.decompose, Vec::new())
    }

    async fn search_phrase(&self, claim: &str) -> Result<String, ExternalError> {
        Ok(claim.to_string())
    }

    async fn verify_claim(
        &self,
        _claim: &str,
        _snippets: &str,
    ) -> Result<ClaimVerdict, ExternalError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        pop_or(&self.verdicts, ClaimVerdict::Unknown)
    }

    async fn judge_logic(
        &self,
        _plan_text: &str,
        _steps: &[PlanStep],
        _repo_map: &str,
    ) -> Result<u8, ExternalError> {
        pop_or(&self.logic, 3)
    }

    async fn judge_equivalence(
        &self,
        _context: &EquivalenceContext<'_>,
    ) -> Result<u8, ExternalError> {
        pop_or(&self.equivalence, 3)
    }

    async fn judge_rubric(&self, _plan_text: &str) -> Result<RubricScores, ExternalError> {
        pop_or(
            &self.rubric,
            RubricScores {
                conciseness: 3,
                precision: 3,
                tone: 3,
                formatting: 3,
            },
        )
    }

    async fn classify_commit(&self, _message: &str) -> Result<CommitKind, ExternalError> {
        pop_or(&self.kinds, CommitKind::Feature)
    }

    async fn derive_task_prompt(
        &self,
        _repo_map: &str,
        _message: &str,
        _diff: &str,
    ) -> Result<(String, Difficulty), ExternalError> {
        pop_or(
            &self.prompts,
            ("Make the change.".to_string(), Difficulty::Medium),
        )
    }
}

/// Search client that replays scripted result batches.
#[derive(Default)]
pub struct ScriptedSearch {
    responses: Mutex<VecDeque<Result<Vec<SearchHit>, ExternalError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<Vec<SearchHit>, ExternalError>) {
        self.responses.lock().unwrap().push_back(result);
    }

    /// Queue one successful batch with a single snippet.
    pub fn push_snippet(&self, snippet: &str) {
        self.push(Ok(vec![SearchHit {
            title: String::new(),
            snippet: snippet.to_string(),
            url: "https://example.com".to_string(),
        }]));
    }
}

#[async_trait]
impl SearchClient for ScriptedSearch {
    async fn search(&self, _query: &str, _count: usize) -> Result<Vec<SearchHit>, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Agent that returns a fixed plan text, or a scripted failure per call.
pub struct ScriptedAgent {
    outcomes: Mutex<VecDeque<PlanOutcome>>,
    default_text: String,
    pub calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(default_text: &str) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_text: default_text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, outcome: PlanOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl PlanAgent for ScriptedAgent {
    async fn run_plan(&self, _prompt: &str, _workdir: &Path) -> Result<PlanOutcome, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| PlanOutcome {
            status: RunStatus::Success,
            text: self.default_text.clone(),
        }))
    }
}
