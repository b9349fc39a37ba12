//! Planning-agent collaborator.
//!
//! The agent is an external CLI run in plan mode inside a task's checkout.
//! Its stdout is the plan document. A run that exceeds the wall-clock budget
//! or exits non-zero still yields an outcome so the failure lands in the
//! ledger instead of aborting the stage.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use planeval_state::RunStatus;

use crate::config::EvalConfig;
use crate::error::ExternalError;

/// What one agent invocation produced.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub status: RunStatus,
    /// The plan text on success; diagnostic output otherwise.
    pub text: String,
}

/// Runs the planning agent for one task.
#[async_trait]
pub trait PlanAgent: Send + Sync {
    async fn run_plan(&self, prompt: &str, workdir: &Path) -> Result<PlanOutcome, ExternalError>;
}

/// Spawns the configured agent command with the task prompt as its final
/// argument, working directory set to the task's checkout.
pub struct CliPlanAgent {
    command: Vec<String>,
    timeout: Duration,
}

impl CliPlanAgent {
    pub fn new(config: &EvalConfig) -> Result<Self, ExternalError> {
        if config.agent_cmd.is_empty() {
            return Err(ExternalError::Client {
                status: 400,
                message: "agent_cmd is empty".to_string(),
            });
        }
        Ok(Self {
            command: config.agent_cmd.clone(),
            timeout: Duration::from_secs(config.plan_timeout_secs),
        })
    }
}

#[async_trait]
impl PlanAgent for CliPlanAgent {
    async fn run_plan(&self, prompt: &str, workdir: &Path) -> Result<PlanOutcome, ExternalError> {
        let mut cmd = tokio::process::Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg(prompt)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(workdir = %workdir.display(), "starting plan-mode agent");
        let mut child = cmd.spawn().map_err(|err| {
            ExternalError::Client {
                status: 400,
                message: format!("failed to spawn agent '{}': {err}", self.command[0]),
            }
        })?;

        // Drain stdout while waiting so a chatty agent cannot fill the pipe
        // and deadlock against its own exit.
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let run = async {
            let mut out = String::new();
            let mut err_out = String::new();
            if let Some(pipe) = stdout.as_mut() {
                pipe.read_to_string(&mut out).await.ok();
            }
            if let Some(pipe) = stderr.as_mut() {
                pipe.read_to_string(&mut err_out).await.ok();
            }
            let status = child.wait().await;
            (status, out, err_out)
        };

        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "agent run exceeded its budget"
                );
                Ok(PlanOutcome {
                    status: RunStatus::Timeout,
                    text: String::new(),
                })
            }
            Ok((Err(err), _, _)) => Err(ExternalError::Transient(format!(
                "failed to wait on agent process: {err}"
            ))),
            Ok((Ok(exit), out, err_out)) => {
                if exit.success() && !out.trim().is_empty() {
                    Ok(PlanOutcome {
                        status: RunStatus::Success,
                        text: out,
                    })
                } else {
                    warn!(code = exit.code(), "agent run failed");
                    Ok(PlanOutcome {
                        status: RunStatus::AgentError,
                        text: if err_out.trim().is_empty() { out } else { err_out },
                    })
                }
            }
        }
    }
}
