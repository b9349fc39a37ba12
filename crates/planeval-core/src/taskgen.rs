//! Stage two: synthesize evaluation tasks from merge history.
//!
//! Each merged PR on the mainline is a candidate task: its first parent is
//! the repository state the agent plans against, its diff is the ground
//! truth, and the judge reverse-engineers the user prompt that would have
//! triggered the change.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use planeval_state::{Difficulty, GroundTruth, TaskLedger, TaskObject, TaskType};

use crate::config::EvalConfig;
use crate::contextize::load_repo_map;
use crate::git::{self, MergeCommit};
use crate::judge::{CommitKind, JudgeClient};

/// Share of generated tasks per type: features dominate, refactors trail.
const MIX: [(TaskType, f64); 3] = [
    (TaskType::FeatureRequest, 0.5),
    (TaskType::BugFix, 0.3),
    (TaskType::CodeRefactoring, 0.2),
];

/// Parse a unified git diff into (modified, created) path lists, in diff
/// order. A path counted as created never also appears as modified.
///
/// Git quotes header paths containing spaces or special characters
/// (`diff --git "a/x y" "b/x y"`); both header forms are handled.
pub fn parse_diff_files(diff: &str) -> (Vec<String>, Vec<String>) {
    let mut modified: Vec<String> = Vec::new();
    let mut created: Vec<String> = Vec::new();
    let header = match Regex::new(r"^diff --git a/(.+?) b/(\S+)") {
        Ok(re) => re,
        Err(_) => return (modified, created),
    };
    let quoted_header = match Regex::new(r#"^diff --git "a/(.+)" "b/(.+)""#) {
        Ok(re) => re,
        Err(_) => return (modified, created),
    };

    let lines: Vec<&str> = diff.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = quoted_header
            .captures(lines[i])
            .or_else(|| header.captures(lines[i]))
        else {
            i += 1;
            continue;
        };
        let a_path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let b_path = caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_string();
        let mut is_new = a_path == "/dev/null";
        i += 1;
        while i < lines.len() && !lines[i].starts_with("diff --git ") {
            if lines[i].starts_with("new file") {
                is_new = true;
            }
            i += 1;
        }
        if is_new {
            if !created.contains(&b_path) {
                created.push(b_path);
            }
        } else if !modified.contains(&b_path) {
            modified.push(b_path);
        }
    }
    modified.retain(|p| !created.contains(p));
    (modified, created)
}

/// Detect dependencies added in manifest hunks (package.json dependency
/// blocks, requirements.txt lines).
pub fn parse_libraries_added(diff: &str) -> BTreeSet<String> {
    let mut added = BTreeSet::new();

    let mut in_package_json = false;
    let mut in_deps_block = false;
    let dep_entry = Regex::new(r#"^\+\s*"([A-Za-z0-9@/_.-]+)"\s*:\s*"[~^]?\d"#).ok();
    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            in_package_json = line.ends_with("package.json");
            in_deps_block = false;
            continue;
        }
        if !in_package_json {
            continue;
        }
        let content = line.strip_prefix('+').or_else(|| line.strip_prefix(' ')).unwrap_or(line);
        if content.contains("\"dependencies\"") || content.contains("\"devDependencies\"") {
            in_deps_block = true;
            continue;
        }
        if in_deps_block && content.trim_start().starts_with('}') {
            in_deps_block = false;
            continue;
        }
        if in_deps_block {
            if let Some(re) = &dep_entry {
                if let Some(caps) = re.captures(line) {
                    if let Some(name) = caps.get(1) {
                        added.insert(name.as_str().to_string());
                    }
                }
            }
        }
    }

    let mut in_requirements = false;
    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            in_requirements = line.contains("requirements") && line.ends_with(".txt");
            continue;
        }
        if !in_requirements || !line.starts_with('+') || line.starts_with("+++") {
            continue;
        }
        let entry = line[1..].split('#').next().unwrap_or("").trim();
        if entry.is_empty() {
            continue;
        }
        let name: String = entry
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect();
        if !name.is_empty() {
            added.insert(name);
        }
    }

    added
}

/// Cheap key-addition summary: the commit subject line plus a few hints the
/// diff gives away. Capped at five entries.
fn heuristic_key_additions(message: &str, diff: &str) -> Vec<String> {
    let mut key_additions = Vec::new();
    let first_line = message.lines().next().unwrap_or("").trim();
    if !first_line.is_empty() && first_line.len() < 200 {
        key_additions.push(first_line.to_string());
    }
    let diff_lower = diff.to_lowercase();
    if diff_lower.contains("retry") || message.to_lowercase().contains("retry") {
        key_additions.push("retry logic".to_string());
    }
    if diff.contains("const ") || diff.contains("MAX_") {
        key_additions.push("constant".to_string());
    }
    if diff_lower.contains("test")
        && (diff.contains("+def ") || diff.contains("+it(") || diff.contains("+#[test]"))
    {
        key_additions.push("tests".to_string());
    }
    key_additions.truncate(5);
    key_additions
}

/// Build ground truth for one merge from its diff and message.
pub fn extract_ground_truth(diff: &str, message: &str) -> GroundTruth {
    let (modified, created) = parse_diff_files(diff);
    GroundTruth {
        files_modified: modified.into_iter().collect(),
        files_created: created.into_iter().collect(),
        key_additions: heuristic_key_additions(message, diff),
        libraries_added: parse_libraries_added(diff),
    }
}

fn kind_to_type(kind: CommitKind) -> Option<TaskType> {
    match kind {
        CommitKind::Feature => Some(TaskType::FeatureRequest),
        CommitKind::BugFix => Some(TaskType::BugFix),
        CommitKind::Refactor => Some(TaskType::CodeRefactoring),
        CommitKind::DoNotUse => None,
    }
}

/// Pick up to `max_tasks` classified merges, targeting the 50/30/20
/// feature/bug/refactor mix. Per-type quotas fill in classification order;
/// spare capacity backfills from whatever is left, so a history short on one
/// type still yields a full batch.
pub fn select_mix(
    candidates: Vec<(MergeCommit, TaskType)>,
    max_tasks: usize,
) -> Vec<(MergeCommit, TaskType)> {
    let mut chosen: Vec<(MergeCommit, TaskType)> = Vec::new();
    let mut leftovers: Vec<(MergeCommit, TaskType)> = Vec::new();

    for (task_type, share) in MIX {
        let quota = ((max_tasks as f64) * share).round() as usize;
        let mut taken = 0usize;
        for entry in candidates.iter().filter(|(_, t)| *t == task_type) {
            if taken < quota && chosen.len() < max_tasks {
                chosen.push(entry.clone());
                taken += 1;
            } else {
                leftovers.push(entry.clone());
            }
        }
    }
    for entry in leftovers {
        if chosen.len() >= max_tasks {
            break;
        }
        chosen.push(entry);
    }
    chosen.truncate(max_tasks);
    chosen
}

/// Harvest merges, classify, extract ground truth, derive prompts, and write
/// `TaskObject`s into the ledger. Returns the number of tasks generated.
///
/// Judge failures are task-local: a merge whose classification fails is
/// treated as a feature, and a failed prompt derivation degrades to a
/// placeholder prompt at Medium difficulty.
pub async fn generate_tasks(
    config: &EvalConfig,
    judge: &dyn JudgeClient,
    ledger: &dyn TaskLedger,
) -> Result<usize> {
    let repo_dir = config.repo_dir();
    let repo_map = load_repo_map(config)?;
    let merges = git::extract_merge_commits(&repo_dir, config.max_merge_commits)
        .context("failed to harvest merge commits")?;
    info!(merges = merges.len(), "classifying merge commits");

    write_merge_commits(config, &merges)?;

    let mut candidates = Vec::new();
    for merge in merges {
        if merge.diff.trim().is_empty() {
            continue;
        }
        let kind = match judge.classify_commit(&merge.message).await {
            Ok(kind) => kind,
            Err(err) => {
                warn!(merge = %merge.merge_sha, error = %err, "classification failed, assuming feature");
                CommitKind::Feature
            }
        };
        if let Some(task_type) = kind_to_type(kind) {
            candidates.push((merge, task_type));
        }
    }

    let selected = select_mix(candidates, config.max_tasks);
    let mut generated = 0usize;
    for (index, (merge, task_type)) in selected.into_iter().enumerate() {
        let task_id = format!("task_{:03}", index + 1);
        let ground_truth = extract_ground_truth(&merge.diff, &merge.message);
        let (prompt, difficulty) = match judge
            .derive_task_prompt(&repo_map, &merge.message, &merge.diff)
            .await
        {
            Ok(pair) => pair,
            Err(err) => {
                warn!(task_id, error = %err, "prompt derivation failed, using placeholder");
                (
                    "Implement the change suggested by the commit.".to_string(),
                    Difficulty::Medium,
                )
            }
        };
        let task = TaskObject {
            task_id: task_id.clone(),
            prompt,
            repo_state_commit: merge.parent_sha.clone(),
            ground_truth,
            difficulty,
            task_type,
        };
        ledger.put_task(&task).await?;
        info!(task_id, task_type = task_type.name(), "task written");
        generated += 1;
    }
    Ok(generated)
}

/// Persist the harvested merges so grading can look up the commit message
/// and diff behind each task's `repo_state_commit`.
fn write_merge_commits(config: &EvalConfig, merges: &[MergeCommit]) -> Result<()> {
    let path = config.merge_commits_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(merges)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load the recorded merges keyed by parent commit.
pub fn load_merge_commits_by_parent(
    config: &EvalConfig,
) -> Result<std::collections::HashMap<String, MergeCommit>> {
    let path = config.merge_commits_path();
    if !path.exists() {
        return Ok(Default::default());
    }
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let merges: Vec<MergeCommit> = serde_json::from_str(&json)?;
    Ok(merges
        .into_iter()
        .map(|m| (m.parent_sha.clone(), m))
        .collect())
}
