//! Error taxonomy for calls to external collaborators.
//!
//! Every failure of a judge, search, or agent call is classified into one of
//! these variants; the classification decides what happens next:
//! - `Transient` is retried with exponential backoff.
//! - `QuotaExhausted` is never retried and degrades remaining claim
//!   verification work to Unknown.
//! - `SchemaViolation` is retried once with a stricter instruction, then
//!   fails the sub-computation that issued the call.
//! - `Client` and `Timeout` terminate the current task's remaining work only.

use thiserror::Error;

/// A failed call to an external collaborator.
#[derive(Error, Debug)]
pub enum ExternalError {
    /// Network failure or 5xx response; safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Rate limit or quota exceeded (429); retrying would make it worse.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// The judge returned output that does not conform to the requested
    /// schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Other 4xx response (bad request, auth failure); not retryable.
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    /// The call exceeded its per-call timeout.
    #[error("call timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ExternalError {
    /// Whether the retry loop should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalError::Transient(_) | ExternalError::Timeout { .. })
    }

    /// Classify an HTTP status code from a collaborator response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 500);
        match status {
            429 => ExternalError::QuotaExhausted(message),
            s if (500..600).contains(&s) => ExternalError::Transient(format!("HTTP {s}: {message}")),
            s => ExternalError::Client { status: s, message },
        }
    }
}

impl From<reqwest::Error> for ExternalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExternalError::Timeout { seconds: 0 }
        } else {
            ExternalError::Transient(err.to_string())
        }
    }
}

/// Errors from the git collaborator.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },
}

pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
