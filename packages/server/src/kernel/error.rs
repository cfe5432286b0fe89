//! Error types for the orchestrator adapters.

use thiserror::Error;

/// Failure of an external orchestrator command (helm / kubectl).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{tool} command failed: {command}\nstdout: {stdout}\nstderr: {stderr}")]
    Failed {
        tool: &'static str,
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("{tool} command timed out after {timeout_seconds}s: {command}")]
    TimedOut {
        tool: &'static str,
        command: String,
        timeout_seconds: u64,
    },

    #[error("failed to run {tool}: {source}")]
    Io {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("secret key {key} not found in secret {secret_name}")]
    SecretKeyMissing { secret_name: String, key: String },

    #[error("failed to decode secret value: {0}")]
    SecretDecode(String),
}

/// The store URL never answered with a non-5xx status before the deadline.
///
/// Non-fatal during provisioning: install success is authoritative and the
/// worker records a warning event instead of failing the job.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("store URL did not become ready in time: {last_error}")]
    Timeout { last_error: String },
}
