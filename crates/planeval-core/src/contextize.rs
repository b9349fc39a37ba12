//! Stage one: clone the target repository and package it into a repo map.
//!
//! The repo map is a single compressed XML document produced by an external
//! packager (repomix by default). It is consumed verbatim by the judge
//! prompts of later stages.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::EvalConfig;
use crate::git;

/// Clone (or refresh) the repository and produce the repo map artifact.
///
/// Returns the path the repo map was written to. Idempotence is handled by
/// the caller; this function always regenerates.
pub fn contextize_repo(config: &EvalConfig) -> Result<PathBuf> {
    if config.repo_url.trim().is_empty() {
        bail!("repo_url is not configured");
    }
    let repo_dir = config.repo_dir();
    git::clone_or_fetch(&config.repo_url, &config.branch, &repo_dir)
        .context("failed to clone repository")?;

    let out_path = config.repo_map_path();
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    run_packager(&config.packager_cmd, &repo_dir, &out_path)?;
    info!(path = %out_path.display(), "repo map written");
    Ok(out_path)
}

/// Invoke the packager command with the repo path and output path appended.
fn run_packager(packager_cmd: &[String], repo_dir: &Path, out_path: &Path) -> Result<()> {
    let Some((program, args)) = packager_cmd.split_first() else {
        bail!("packager_cmd is empty");
    };
    let output = Command::new(program)
        .args(args)
        .arg(repo_dir)
        .arg("--output")
        .arg(out_path)
        .output()
        .with_context(|| format!("failed to run packager '{program}'"))?;
    if !output.status.success() {
        bail!(
            "packager failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    if !out_path.exists() {
        bail!("packager did not produce {}", out_path.display());
    }
    Ok(())
}

/// Read the repo map, truncated to the configured character budget so it
/// fits judge prompts.
pub fn load_repo_map(config: &EvalConfig) -> Result<String> {
    let path = config.repo_map_path();
    let mut content = std::fs::read_to_string(&path)
        .with_context(|| format!("repo map not found at {} (run contextize first)", path.display()))?;
    if content.chars().count() > config.repo_map_max_chars {
        content = content.chars().take(config.repo_map_max_chars).collect();
        content.push_str("\n... [truncated]");
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packager_output_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("map.xml");
        // `true` succeeds but writes nothing
        let err = run_packager(&["true".to_string()], dir.path(), &out).unwrap_err();
        assert!(err.to_string().contains("did not produce"));
    }

    #[test]
    fn load_repo_map_truncates_to_budget() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvalConfig {
            data_dir: dir.path().to_path_buf(),
            repo_map_max_chars: 10,
            ..Default::default()
        };
        std::fs::write(config.repo_map_path(), "x".repeat(100)).unwrap();
        let map = load_repo_map(&config).unwrap();
        assert!(map.starts_with("xxxxxxxxxx"));
        assert!(map.ends_with("[truncated]"));
    }

    #[test]
    fn load_repo_map_missing_file_names_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvalConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = load_repo_map(&config).unwrap_err();
        assert!(err.to_string().contains("contextize"));
    }
}
