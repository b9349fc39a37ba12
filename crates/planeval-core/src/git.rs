//! Version-control collaborator: clone, merge-commit harvesting, and
//! per-task worktree checkouts.
//!
//! All operations shell out to `git`; the pipeline never links a git
//! library. Diffs over 500 kB are truncated before storage.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GitError;

const MAX_DIFF_BYTES: usize = 500_000;

/// One harvested merge commit: the revision a task starts from is the
/// merge's first parent, and the diff is the recorded ground-truth change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCommit {
    pub merge_sha: String,
    pub parent_sha: String,
    pub message: String,
    pub diff: String,
}

fn run_git(repo: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git").args(args).current_dir(repo).output()?;
    if !output.status.success() {
        return Err(GitError::Command {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// `https://github.com/owner/repo(.git)` → `owner_repo`.
pub fn repo_slug(repo_url: &str) -> String {
    let url = repo_url.trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    let normalized = url.replace(':', "/");
    let parts: Vec<&str> = normalized.split('/').map(str::trim).collect();
    if parts.len() >= 2 {
        let tail = &parts[parts.len() - 2..];
        return format!("{}_{}", tail[0], tail[1]);
    }
    url.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Capture the HEAD commit SHA of a repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String, GitError> {
    let sha = run_git(repo_dir, &["rev-parse", "HEAD"])?.trim().to_string();
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check whether a revision resolves to a real commit in the repository.
pub fn commit_exists(repo_dir: &Path, sha: &str) -> bool {
    run_git(repo_dir, &["cat-file", "-e", &format!("{sha}^{{commit}}")]).is_ok()
}

/// Clone the repository into `dest`, or fetch if it is already cloned.
/// A full clone, so enough merge history is available for task generation.
pub fn clone_or_fetch(repo_url: &str, branch: &str, dest: &Path) -> Result<(), GitError> {
    if dest.join(".git").exists() {
        info!(dest = %dest.display(), "repository already cloned, fetching");
        run_git(dest, &["fetch", "--all"])?;
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(GitError::Spawn)?;
    }
    info!(url = %repo_url, dest = %dest.display(), "cloning repository");
    let dest_str = dest.to_string_lossy();
    let output = Command::new("git")
        .args(["clone", "--branch", branch, repo_url, dest_str.as_ref()])
        .output()?;
    if !output.status.success() {
        return Err(GitError::Command {
            command: format!("git clone {repo_url}"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Harvest the last `max_commits` merge commits along the first-parent line
/// (i.e. merged PRs on the mainline), newest first.
///
/// For each merge: parent = `merge^` (the mainline state before the merge),
/// diff = `git diff merge^ merge`, so the full merged change is visible
/// even for cleanly merged commits (`git show` on a merge prints the
/// combined-diff format, which is empty unless the merge had conflicts).
/// Merges whose parent cannot be resolved are skipped; empty diffs are
/// kept so classification can reject them.
pub fn extract_merge_commits(
    repo_dir: &Path,
    max_commits: usize,
) -> Result<Vec<MergeCommit>, GitError> {
    let log = run_git(
        repo_dir,
        &[
            "log",
            "-n",
            &max_commits.to_string(),
            "--merges",
            "--first-parent",
            "--format=%H",
        ],
    )?;

    let mut merges = Vec::new();
    for merge_sha in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parent_sha = match run_git(repo_dir, &["rev-parse", &format!("{merge_sha}^")]) {
            Ok(out) => out.trim().to_string(),
            Err(_) => continue,
        };
        let message = run_git(repo_dir, &["log", "-1", "--format=%B", merge_sha])?
            .trim()
            .to_string();
        let mut diff = run_git(
            repo_dir,
            &["diff", "--no-renames", "--no-color", &parent_sha, merge_sha],
        )
        .unwrap_or_default();
        if diff.len() > MAX_DIFF_BYTES {
            let mut end = MAX_DIFF_BYTES;
            while !diff.is_char_boundary(end) {
                end -= 1;
            }
            diff.truncate(end);
            diff.push_str("\n... [truncated]");
        }
        merges.push(MergeCommit {
            merge_sha: merge_sha.to_string(),
            parent_sha,
            message,
            diff,
        });
    }
    debug!(count = merges.len(), "harvested merge commits");
    Ok(merges)
}

/// A detached worktree checked out at a specific commit, removed on drop.
///
/// Worktrees give each concurrently-running task its own checkout without
/// mutating the shared clone's working tree.
pub struct Worktree {
    repo_dir: PathBuf,
    path: PathBuf,
}

impl Worktree {
    /// Create a detached worktree of `repo_dir` at `commit` under `path`.
    pub fn add(repo_dir: &Path, commit: &str, path: &Path) -> Result<Self, GitError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(GitError::Spawn)?;
        }
        let path_str = path.to_string_lossy();
        run_git(
            repo_dir,
            &["worktree", "add", "--detach", "--force", path_str.as_ref(), commit],
        )?;
        Ok(Self {
            repo_dir: repo_dir.to_path_buf(),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Worktree {
    fn drop(&mut self) {
        let path_str = self.path.to_string_lossy().to_string();
        if let Err(err) = run_git(
            &self.repo_dir,
            &["worktree", "remove", "--force", &path_str],
        ) {
            tracing::warn!(path = %path_str, error = %err, "failed to remove worktree");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_repo_with_merge() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        git(p, &["init", "-b", "main"]);
        git(p, &["config", "user.name", "test-user"]);
        git(p, &["config", "user.email", "test@example.com"]);
        std::fs::write(p.join("base.txt"), "base\n").unwrap();
        git(p, &["add", "."]);
        git(p, &["commit", "-m", "initial"]);
        git(p, &["checkout", "-b", "feature"]);
        std::fs::write(p.join("feature.txt"), "feature\n").unwrap();
        git(p, &["add", "."]);
        git(p, &["commit", "-m", "add feature file"]);
        git(p, &["checkout", "main"]);
        git(p, &["merge", "--no-ff", "feature", "-m", "Merge feature branch"]);
        dir
    }

    #[test]
    fn repo_slug_from_urls() {
        assert_eq!(repo_slug("https://github.com/acme/widget"), "acme_widget");
        assert_eq!(repo_slug("https://github.com/acme/widget.git"), "acme_widget");
        assert_eq!(repo_slug("git@github.com:acme/widget.git"), "acme_widget");
    }

    #[test]
    fn capture_head_sha_returns_hex() {
        let repo = make_repo_with_merge();
        let sha = capture_head_sha(repo.path()).unwrap();
        assert_eq!(sha.len(), 40);
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn extract_merges_finds_the_merge_and_its_parent() {
        let repo = make_repo_with_merge();
        let merges = extract_merge_commits(repo.path(), 10).unwrap();
        assert_eq!(merges.len(), 1);
        let m = &merges[0];
        assert_eq!(m.parent_sha.len(), 40);
        assert!(m.message.contains("Merge feature branch"));
        // A clean merge must still expose the merged change in its diff
        assert!(m.diff.contains("diff --git a/feature.txt b/feature.txt"));
        assert!(m.diff.contains("+feature"));
        assert!(commit_exists(repo.path(), &m.parent_sha));
    }

    #[test]
    fn worktree_checks_out_commit_and_cleans_up() {
        let repo = make_repo_with_merge();
        let merges = extract_merge_commits(repo.path(), 10).unwrap();
        let parent = &merges[0].parent_sha;

        let wt_dir = tempfile::tempdir().unwrap();
        let wt_path = wt_dir.path().join("task_001");
        {
            let wt = Worktree::add(repo.path(), parent, &wt_path).unwrap();
            // Parent commit predates the merge: feature.txt must not exist
            assert!(wt.path().join("base.txt").exists());
            assert!(!wt.path().join("feature.txt").exists());
        }
        assert!(!wt_path.exists());
    }

    #[test]
    fn commit_exists_rejects_unknown_sha() {
        let repo = make_repo_with_merge();
        assert!(!commit_exists(
            repo.path(),
            "0000000000000000000000000000000000000000"
        ));
    }
}
