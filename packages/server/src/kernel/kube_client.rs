//! Process-exec adapter for the cluster CLI (kubectl).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use super::error::CommandError;
use super::process;
use super::traits::BaseKubeClient;

const COMMAND_GRACE: Duration = Duration::from_secs(30);

pub struct KubeClient {
    binary: String,
    delete_timeout: Duration,
}

impl KubeClient {
    pub fn new(binary: impl Into<String>, delete_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            delete_timeout,
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<std::process::Output, CommandError> {
        let output = process::run("kubectl", &self.binary, args, None, timeout).await?;
        if !output.status.success() {
            return Err(CommandError::Failed {
                tool: "kubectl",
                command: process::render(&self.binary, args),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl BaseKubeClient for KubeClient {
    async fn delete_namespace(&self, namespace: &str) -> Result<(), CommandError> {
        let kubectl_timeout = format!("--timeout={}s", self.delete_timeout.as_secs());
        let args = [
            "delete",
            "namespace",
            namespace,
            "--ignore-not-found=true",
            "--wait=true",
            kubectl_timeout.as_str(),
        ];
        self.run(&args, self.delete_timeout + COMMAND_GRACE).await?;
        Ok(())
    }

    async fn read_secret_value(
        &self,
        namespace: &str,
        secret_name: &str,
        key: &str,
    ) -> Result<String, CommandError> {
        let args = ["get", "secret", secret_name, "-n", namespace, "-o", "json"];
        let output = self.run(&args, COMMAND_GRACE).await?;
        decode_secret_payload(&output.stdout, secret_name, key)
    }
}

/// Pull one key out of a `kubectl get secret -o json` payload and decode the
/// base64 value.
fn decode_secret_payload(
    payload: &[u8],
    secret_name: &str,
    key: &str,
) -> Result<String, CommandError> {
    let parsed: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| CommandError::SecretDecode(e.to_string()))?;
    let encoded = parsed
        .get("data")
        .and_then(|data| data.get(key))
        .and_then(|value| value.as_str())
        .ok_or_else(|| CommandError::SecretKeyMissing {
            secret_name: secret_name.to_string(),
            key: key.to_string(),
        })?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| CommandError::SecretDecode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CommandError::SecretDecode(e.to_string()))
}
