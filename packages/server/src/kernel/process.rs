//! Shared subprocess runner for the orchestrator adapters.

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::CommandError;

/// Run `binary args...` with an optional stdin payload, bounded by `timeout`.
///
/// The child is killed if the timeout fires. Callers are responsible for
/// inspecting the exit status; this only surfaces spawn/IO/timeout failures.
pub(crate) async fn run(
    tool: &'static str,
    binary: &str,
    args: &[&str],
    stdin_payload: Option<String>,
    timeout: Duration,
) -> Result<Output, CommandError> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| CommandError::Io { tool, source })?;

    if let Some(payload) = stdin_payload {
        let mut stdin = child.stdin.take().ok_or_else(|| CommandError::Io {
            tool,
            source: std::io::Error::other("child stdin unavailable"),
        })?;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|source| CommandError::Io { tool, source })?;
        // Dropping stdin closes the pipe so the child sees EOF.
        drop(stdin);
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| CommandError::Io { tool, source }),
        Err(_) => Err(CommandError::TimedOut {
            tool,
            command: render(binary, args),
            timeout_seconds: timeout.as_secs(),
        }),
    }
}

/// Human-readable command line for error messages.
pub(crate) fn render(binary: &str, args: &[&str]) -> String {
    let mut line = String::from(binary);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
