//! Process-exec adapter for the Helm CLI.

use std::time::Duration;

use async_trait::async_trait;

use super::error::CommandError;
use super::process;
use super::traits::BaseHelmClient;

/// Extra headroom over helm's own `--timeout` so helm gets to report its own
/// timeout error before we kill the process.
const COMMAND_GRACE: Duration = Duration::from_secs(30);

pub struct HelmClient {
    binary: String,
}

impl HelmClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(
        &self,
        args: &[&str],
        stdin_payload: Option<String>,
        timeout: Duration,
    ) -> Result<(), CommandError> {
        let output = process::run("helm", &self.binary, args, stdin_payload, timeout).await?;
        if !output.status.success() {
            return Err(CommandError::Failed {
                tool: "helm",
                command: process::render(&self.binary, args),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BaseHelmClient for HelmClient {
    async fn upgrade_install(
        &self,
        release_name: &str,
        namespace: &str,
        chart_path: &str,
        values: &serde_json::Value,
        timeout: Duration,
    ) -> Result<(), CommandError> {
        let helm_timeout = format!("{}s", timeout.as_secs());
        let args = [
            "upgrade",
            "--install",
            release_name,
            chart_path,
            "-n",
            namespace,
            "--create-namespace",
            "-f",
            "-",
            "--wait",
            "--timeout",
            helm_timeout.as_str(),
        ];
        // Helm reads values from stdin; JSON is a YAML subset so the blob can
        // be piped as-is.
        let payload = values.to_string();
        self.run(&args, Some(payload), timeout + COMMAND_GRACE).await
    }

    async fn uninstall(
        &self,
        release_name: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), CommandError> {
        let helm_timeout = format!("{}s", timeout.as_secs());
        let args = [
            "uninstall",
            release_name,
            "-n",
            namespace,
            "--wait",
            "--timeout",
            helm_timeout.as_str(),
        ];
        self.run(&args, None, timeout + COMMAND_GRACE).await
    }
}
