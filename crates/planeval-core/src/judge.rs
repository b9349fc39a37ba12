//! LLM judge collaborator.
//!
//! Every model call the pipeline makes goes through the [`JudgeClient`]
//! trait: plan decomposition, claim verification, soundness and equivalence
//! judgments, the style rubric, and the two task-generation calls. The
//! production implementation speaks to a messages API over HTTP; tests use
//! the scripted fake in [`crate::fakes`].

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use planeval_state::{Difficulty, GroundTruth};

use crate::config::EvalConfig;
use crate::error::{truncate, ExternalError};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// One atomic step of a plan, as extracted by the judge.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub claims: Vec<String>,
}

/// Outcome of verifying one claim against web-search evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimVerdict {
    Verified,
    Hallucination,
    Unknown,
}

impl ClaimVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimVerdict::Verified => "VERIFIED",
            ClaimVerdict::Hallucination => "HALLUCINATION",
            ClaimVerdict::Unknown => "UNKNOWN",
        }
    }
}

/// Category the judge assigns to a merge commit during task generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Feature,
    BugFix,
    Refactor,
    /// Too trivial to warrant a plan (config tweaks, dependency bumps).
    DoNotUse,
}

/// Sub-scores of the style rubric, each on the judge's 1-5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RubricScores {
    pub conciseness: u8,
    pub precision: u8,
    pub tone: u8,
    pub formatting: u8,
}

/// Everything the equivalence judgment needs about one task.
#[derive(Debug, Clone)]
pub struct EquivalenceContext<'a> {
    pub task_prompt: &'a str,
    pub ground_truth: &'a GroundTruth,
    pub plan_text: &'a str,
    /// Message of the merge commit the task was derived from, when known.
    pub commit_message: &'a str,
    /// Diff of that merge commit, when known.
    pub diff_summary: &'a str,
}

/// All model calls made by the pipeline.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Break a plan into steps, each with its externally verifiable claims.
    /// `strict` adds a firmer formatting instruction; used on the one retry
    /// after a schema violation.
    async fn decompose_plan(
        &self,
        plan_text: &str,
        strict: bool,
    ) -> Result<Vec<PlanStep>, ExternalError>;

    /// Rephrase a claim into a short web-search query.
    async fn search_phrase(&self, claim: &str) -> Result<String, ExternalError>;

    /// Compare a claim against search-result snippets.
    async fn verify_claim(
        &self,
        claim: &str,
        snippets: &str,
    ) -> Result<ClaimVerdict, ExternalError>;

    /// Score the plan's logical soundness, 1-5.
    async fn judge_logic(
        &self,
        plan_text: &str,
        steps: &[PlanStep],
        repo_map: &str,
    ) -> Result<u8, ExternalError>;

    /// Score how well the plan achieves the ground-truth change's goal, 1-5.
    async fn judge_equivalence(
        &self,
        context: &EquivalenceContext<'_>,
    ) -> Result<u8, ExternalError>;

    /// Score the plan's writing quality on four sub-dimensions, each 1-5.
    async fn judge_rubric(&self, plan_text: &str) -> Result<RubricScores, ExternalError>;

    /// Classify a merge commit by its message.
    async fn classify_commit(&self, message: &str) -> Result<CommitKind, ExternalError>;

    /// Reverse-engineer the user prompt that would have triggered a diff.
    async fn derive_task_prompt(
        &self,
        repo_map: &str,
        message: &str,
        diff: &str,
    ) -> Result<(String, Difficulty), ExternalError>;
}

const MESSAGES_API_VERSION: &str = "2023-06-01";
const CALL_TIMEOUT_SECS: u64 = 120;

const PLAN_CHARS: usize = 50_000;
const DIFF_CHARS: usize = 100_000;
const REPO_MAP_EXCERPT_CHARS: usize = 8_000;

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Judge backed by an Anthropic-style `/v1/messages` endpoint.
///
/// Cheap extraction calls use the base model; the soundness and equivalence
/// judgments use the strong model.
pub struct HttpJudgeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    model_strong: String,
    retry: RetryPolicy,
}

impl HttpJudgeClient {
    pub fn new(config: &EvalConfig) -> Result<Self, ExternalError> {
        if config.judge_api_key.is_empty() {
            return Err(ExternalError::Client {
                status: 401,
                message: format!("{} is not set", crate::config::JUDGE_API_KEY_VAR),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: config.judge_base_url.trim_end_matches('/').to_string(),
            api_key: config.judge_api_key.clone(),
            model: config.judge_model.clone(),
            model_strong: config.judge_model_strong.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn complete_once(
        &self,
        model: &str,
        max_tokens: u32,
        prompt: &str,
    ) -> Result<String, ExternalError> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", MESSAGES_API_VERSION)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::from_status(status.as_u16(), &body));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();
        debug!(model, response_chars = text.len(), "judge call completed");
        Ok(text)
    }

    async fn complete(
        &self,
        model: &str,
        max_tokens: u32,
        op_name: &str,
        prompt: &str,
    ) -> Result<String, ExternalError> {
        retry_with_backoff(&self.retry, op_name, || {
            self.complete_once(model, max_tokens, prompt)
        })
        .await
    }
}

#[async_trait]
impl JudgeClient for HttpJudgeClient {
    async fn decompose_plan(
        &self,
        plan_text: &str,
        strict: bool,
    ) -> Result<Vec<PlanStep>, ExternalError> {
        let mut prompt = format!(
            "Parse the plan into steps with intent and externally verifiable claims \
             (statements about libraries, APIs, or tools that web search could check).\n\
             Output JSON: {{\"steps\": [{{\"intent\": \"...\", \"claims\": [\"...\"]}}]}}\n\
             Plan:\n{}",
            truncate(plan_text, PLAN_CHARS)
        );
        if strict {
            prompt.push_str(
                "\n\nRespond with the JSON object only. No markdown fences, no prose before \
                 or after it.",
            );
        }
        let text = self.complete(&self.model, 2048, "decompose_plan", &prompt).await?;
        parse_steps(&text)
    }

    async fn search_phrase(&self, claim: &str) -> Result<String, ExternalError> {
        let prompt = format!(
            "Rewrite this claim as a short web search query (under 80 characters, no quotes). \
             Reply with the query only.\nClaim: {}",
            truncate(claim, 500)
        );
        let text = self.complete(&self.model, 64, "search_phrase", &prompt).await?;
        let phrase = text.trim().trim_matches('"').to_string();
        if phrase.is_empty() {
            // Fall back to the claim itself, clipped to a searchable length
            return Ok(truncate(claim, 80).replace('"', ""));
        }
        Ok(phrase)
    }

    async fn verify_claim(
        &self,
        claim: &str,
        snippets: &str,
    ) -> Result<ClaimVerdict, ExternalError> {
        let prompt = format!(
            "Claim from plan: \"{}\"\nSearch result snippets:\n\"{}\"\n\n\
             Do the snippets support the claim or contradict it? Reply with exactly one word: \
             VERIFIED, HALLUCINATION (if contradicted), or UNKNOWN (if unclear).",
            truncate(claim, 500),
            truncate(snippets, 4_000)
        );
        let text = self.complete(&self.model, 32, "verify_claim", &prompt).await?;
        let upper = text.trim().to_uppercase();
        if upper.contains("VERIFIED") {
            Ok(ClaimVerdict::Verified)
        } else if upper.contains("HALLUCINATION") || upper.contains("CONTRADICT") {
            Ok(ClaimVerdict::Hallucination)
        } else {
            Ok(ClaimVerdict::Unknown)
        }
    }

    async fn judge_logic(
        &self,
        plan_text: &str,
        steps: &[PlanStep],
        repo_map: &str,
    ) -> Result<u8, ExternalError> {
        let steps_summary = steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Step {}: {}", i + 1, s.intent))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Repo context (excerpt): {}\n\nPlan steps:\n{}\n\nFull plan (excerpt): {}\n\n\
             Evaluate: (1) Does any step require an output that a previous step fails to \
             produce? (2) Is the overall plan logically sound and does it solve the problem?\n\
             Reply with SCORE: <1-5> (1=very unsound, 5=very sound) then one sentence.",
            truncate(repo_map, REPO_MAP_EXCERPT_CHARS),
            steps_summary,
            truncate(plan_text, 6_000)
        );
        let text = self
            .complete(&self.model_strong, 256, "judge_logic", &prompt)
            .await?;
        parse_grade(&text, "SCORE")
    }

    async fn judge_equivalence(
        &self,
        context: &EquivalenceContext<'_>,
    ) -> Result<u8, ExternalError> {
        let gt = context.ground_truth;
        let prompt = format!(
            "User task: {}\n\nGround truth of the change that actually shipped:\n\
             Files modified: {}\nFiles created: {}\nKey additions: {}\nLibraries added: {}\n\
             Commit message: {}\nDiff (excerpt): {}\n\nAI plan:\n{}\n\n\
             Would executing this plan achieve the same goal as the shipped change? \
             Reply with GRADE: <1-5> (1=completely different goal, 5=same goal, same approach) \
             then one sentence.",
            context.task_prompt,
            join_set(&gt.files_modified),
            join_set(&gt.files_created),
            gt.key_additions.join(", "),
            join_set(&gt.libraries_added),
            or_na(&truncate(context.commit_message, 2_000)),
            or_na(&truncate(context.diff_summary, REPO_MAP_EXCERPT_CHARS)),
            truncate(context.plan_text, 6_000)
        );
        let text = self
            .complete(&self.model_strong, 256, "judge_equivalence", &prompt)
            .await?;
        parse_grade(&text, "GRADE")
    }

    async fn judge_rubric(&self, plan_text: &str) -> Result<RubricScores, ExternalError> {
        let prompt = format!(
            "Evaluate the writing quality of this plan on four dimensions, each 1-5:\n\
             CONCISENESS (no padding or repetition), PRECISION (concrete names and paths over \
             vague references), TONE (professional, matter-of-fact), FORMATTING (clean \
             structure, consistent markup).\n\
             Reply with four lines, e.g. CONCISENESS: 4\n\nPlan:\n{}",
            truncate(plan_text, REPO_MAP_EXCERPT_CHARS)
        );
        let text = self.complete(&self.model, 256, "judge_rubric", &prompt).await?;
        Ok(RubricScores {
            conciseness: parse_grade(&text, "CONCISENESS")?,
            precision: parse_grade(&text, "PRECISION")?,
            tone: parse_grade(&text, "TONE")?,
            formatting: parse_grade(&text, "FORMATTING")?,
        })
    }

    async fn classify_commit(&self, message: &str) -> Result<CommitKind, ExternalError> {
        let prompt = format!(
            "Classify this git merge commit into exactly one category based on its message.\n\n\
             Categories:\n\
             - feature_request: New functionality, new feature, enhancement, or new capability.\n\
             - bug_fix: Fixing a bug, correcting incorrect behavior, or fixing a regression.\n\
             - code_refactoring: Restructuring code without changing behavior (renames, \
             extracting functions, style cleanup, no new features or bug fixes).\n\
             - do_not_use: Trivial changes, tiny tweaks, config-only updates, dependency bumps, \
             or anything else too small to warrant an AI agent writing a plan.\n\n\
             Reply with exactly one line:\n\
             TYPE: <feature_request | bug_fix | code_refactoring | do_not_use>\n\n\
             Commit message:\n{}",
            truncate(message, 4_000)
        );
        let text = self.complete(&self.model, 64, "classify_commit", &prompt).await?;
        Ok(parse_commit_kind(&text))
    }

    async fn derive_task_prompt(
        &self,
        repo_map: &str,
        message: &str,
        diff: &str,
    ) -> Result<(String, Difficulty), ExternalError> {
        let prompt = format!(
            "Reverse-engineer this git diff. Write the prompt a user would have asked to \
             trigger this change. Do not mention the solution.\n\
             Output exactly two lines:\n\
             PROMPT: <user prompt>\nDIFFICULTY: <Easy | Medium | Hard>\n\n\
             Repo Map (context):\n{}\n\nCommit message:\n{}\n\nDiff:\n{}",
            repo_map,
            truncate(message, 4_000),
            truncate(diff, DIFF_CHARS)
        );
        let text = self
            .complete(&self.model, 1024, "derive_task_prompt", &prompt)
            .await?;
        Ok(parse_task_prompt(&text))
    }
}

fn join_set(set: &std::collections::BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn or_na(s: &str) -> String {
    if s.trim().is_empty() {
        "N/A".to_string()
    } else {
        s.to_string()
    }
}

/// Pull the `{"steps": [...]}` object out of judge output, tolerating
/// surrounding prose and markdown fences.
fn parse_steps(text: &str) -> Result<Vec<PlanStep>, ExternalError> {
    let mut json_str = text.trim();
    if let Ok(re) = Regex::new(r#"\{[\s\S]*"steps"[\s\S]*\}"#) {
        if let Some(m) = re.find(text) {
            json_str = m.as_str();
        }
    }

    #[derive(Deserialize)]
    struct StepsEnvelope {
        #[serde(default)]
        steps: Vec<PlanStep>,
    }

    match serde_json::from_str::<StepsEnvelope>(json_str) {
        Ok(envelope) => Ok(envelope.steps),
        Err(err) => Err(ExternalError::SchemaViolation(format!(
            "decompose_plan output is not the expected JSON: {err}"
        ))),
    }
}

/// Parse `LABEL: <n>` from judge output, requiring n in 1..=5.
fn parse_grade(text: &str, label: &str) -> Result<u8, ExternalError> {
    if let Ok(re) = Regex::new(&format!(r"(?i){label}\s*:\s*([1-5])")) {
        if let Some(caps) = re.captures(text) {
            if let Some(digit) = caps.get(1) {
                if let Ok(n) = digit.as_str().parse::<u8>() {
                    return Ok(n);
                }
            }
        }
    }
    Err(ExternalError::SchemaViolation(format!(
        "no '{label}: <1-5>' line in judge output: {}",
        truncate(text, 200)
    )))
}

fn parse_commit_kind(text: &str) -> CommitKind {
    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line
            .strip_prefix("TYPE:")
            .or_else(|| line.strip_prefix("type:"))
        else {
            continue;
        };
        let raw = rest.trim().to_lowercase().replace(' ', "_");
        return match raw.as_str() {
            "feature_request" => CommitKind::Feature,
            "bug_fix" => CommitKind::BugFix,
            "code_refactoring" => CommitKind::Refactor,
            "do_not_use" => CommitKind::DoNotUse,
            other if other.contains("feature") => CommitKind::Feature,
            other if other.contains("bug") || other.contains("fix") => CommitKind::BugFix,
            other if other.contains("refactor") => CommitKind::Refactor,
            _ => CommitKind::Feature,
        };
    }
    CommitKind::Feature
}

fn parse_task_prompt(text: &str) -> (String, Difficulty) {
    let mut prompt = String::new();
    let mut difficulty = Difficulty::Medium;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_label(trimmed, "PROMPT") {
            prompt = rest.to_string();
        } else if let Some(rest) = strip_label(trimmed, "DIFFICULTY") {
            difficulty = match rest.to_lowercase().as_str() {
                "easy" => Difficulty::Easy,
                "hard" => Difficulty::Hard,
                _ => Difficulty::Medium,
            };
        }
    }
    if prompt.is_empty() {
        prompt = text.trim().to_string();
    }
    if prompt.is_empty() {
        prompt = "Implement the change suggested by the commit.".to_string();
    }
    (prompt, difficulty)
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let (head, rest) = line.split_once(':')?;
    if head.trim().eq_ignore_ascii_case(label) {
        Some(rest.trim())
    } else {
        None
    }
}
