//! Pipeline configuration.
//!
//! Loaded once at startup from `planeval.yaml` (every field has a default)
//! and passed into each component at construction. API keys come only from
//! the environment, never from the config file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Environment variable holding the judge (LLM) API key.
pub const JUDGE_API_KEY_VAR: &str = "PLANEVAL_JUDGE_API_KEY";

/// Environment variable holding the web-search API key.
pub const SEARCH_API_KEY_VAR: &str = "PLANEVAL_SEARCH_API_KEY";

/// Immutable pipeline configuration, shared by all stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// URL of the repository under evaluation.
    pub repo_url: String,

    /// Branch whose merge history seeds task generation.
    pub branch: String,

    /// Root for all pipeline artifacts (clone, repo map, ledger).
    pub data_dir: PathBuf,

    /// Repository-packaging command; the repo path and `--output <path>`
    /// are appended when the stage invokes it.
    pub packager_cmd: Vec<String>,

    /// Planning-agent command; the task prompt is appended as the final
    /// argument and the process is run inside the task's checkout.
    pub agent_cmd: Vec<String>,

    /// Repo map is truncated to this many characters before judge calls.
    pub repo_map_max_chars: usize,

    /// How many merge commits to harvest from history.
    pub max_merge_commits: usize,

    /// How many tasks to synthesize per run.
    pub max_tasks: usize,

    /// Wall-clock budget for a single plan-mode agent run.
    pub plan_timeout_secs: u64,

    /// Upper bound on externally verified claims per task.
    pub max_claims_per_task: usize,

    /// Worker-pool bound for the run-plans and grade stages.
    pub max_concurrency: usize,

    /// Model for extraction and classification calls.
    pub judge_model: String,

    /// Model for equivalence and soundness judgments.
    pub judge_model_strong: String,

    /// Base URL of the judge messages API.
    pub judge_base_url: String,

    pub retry: RetryPolicy,

    #[serde(skip)]
    pub judge_api_key: String,

    #[serde(skip)]
    pub search_api_key: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            branch: "main".to_string(),
            data_dir: PathBuf::from("data"),
            packager_cmd: vec![
                "npx".to_string(),
                "repomix@latest".to_string(),
                "--style".to_string(),
                "xml".to_string(),
                "--compress".to_string(),
            ],
            agent_cmd: vec![
                "claude".to_string(),
                "-p".to_string(),
                "--permission-mode".to_string(),
                "plan".to_string(),
            ],
            repo_map_max_chars: 150_000,
            max_merge_commits: 100,
            max_tasks: 30,
            plan_timeout_secs: 300,
            max_claims_per_task: 5,
            max_concurrency: 4,
            judge_model: "claude-sonnet-4-20250514".to_string(),
            judge_model_strong: "claude-opus-4-6".to_string(),
            judge_base_url: "https://api.anthropic.com".to_string(),
            retry: RetryPolicy::default(),
            judge_api_key: String::new(),
            search_api_key: String::new(),
        }
    }
}

impl EvalConfig {
    /// Load configuration from a YAML file, falling back to defaults when the
    /// file is absent, then overlay API keys from the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(|| Path::new("planeval.yaml"));
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.judge_api_key = std::env::var(JUDGE_API_KEY_VAR).unwrap_or_default();
        config.search_api_key = std::env::var(SEARCH_API_KEY_VAR).unwrap_or_default();
        Ok(config)
    }

    /// Directory the repository is cloned into.
    pub fn repo_dir(&self) -> PathBuf {
        self.data_dir
            .join("repos")
            .join(crate::git::repo_slug(&self.repo_url))
    }

    /// The compressed repository representation produced by `contextize`.
    pub fn repo_map_path(&self) -> PathBuf {
        self.data_dir.join("repo_map.xml")
    }

    /// Harvested merge commits, kept for grading-time context lookups.
    pub fn merge_commits_path(&self) -> PathBuf {
        self.data_dir.join("merge_commits.json")
    }

    /// Root of the per-task ledger.
    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    /// Scratch directory for per-task git worktrees.
    pub fn worktrees_dir(&self) -> PathBuf {
        self.data_dir.join("worktrees")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = EvalConfig::default();
        assert_eq!(config.max_claims_per_task, 5);
        assert_eq!(config.max_tasks, 30);
        assert_eq!(config.plan_timeout_secs, 300);
        assert_eq!(config.branch, "main");
    }

    #[test]
    fn partial_yaml_overlays_defaults() {
        let yaml = "repo_url: https://github.com/acme/widget\nmax_tasks: 5\n";
        let config: EvalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.repo_url, "https://github.com/acme/widget");
        assert_eq!(config.max_tasks, 5);
        // Untouched fields keep their defaults
        assert_eq!(config.max_claims_per_task, 5);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn artifact_paths_are_rooted_in_data_dir() {
        let config = EvalConfig {
            repo_url: "https://github.com/acme/widget".to_string(),
            data_dir: PathBuf::from("/tmp/eval"),
            ..Default::default()
        };
        assert_eq!(config.repo_map_path(), PathBuf::from("/tmp/eval/repo_map.xml"));
        assert_eq!(config.ledger_dir(), PathBuf::from("/tmp/eval/ledger"));
        assert_eq!(
            config.repo_dir(),
            PathBuf::from("/tmp/eval/repos/acme_widget")
        );
    }
}
