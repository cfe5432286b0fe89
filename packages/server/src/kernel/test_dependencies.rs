// TestDependencies - mock implementations for testing
//
// Provides mock orchestrator adapters that can be injected into ServerKernel
// for tests. Each mock records its calls and can be scripted to fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::error::{CommandError, ReadinessError};
use super::traits::{BaseHelmClient, BaseKubeClient, BaseReadinessProbe};
use super::ServerKernel;

// =============================================================================
// Mock Helm Client
// =============================================================================

/// A recorded `upgrade_install` invocation.
#[derive(Debug, Clone)]
pub struct InstallCall {
    pub release_name: String,
    pub namespace: String,
    pub chart_path: String,
    pub values: serde_json::Value,
}

pub struct MockHelmClient {
    install_calls: Arc<Mutex<Vec<InstallCall>>>,
    uninstall_calls: Arc<Mutex<Vec<(String, String)>>>,
    install_error: Arc<Mutex<Option<String>>>,
    uninstall_error: Arc<Mutex<Option<String>>>,
}

impl MockHelmClient {
    pub fn new() -> Self {
        Self {
            install_calls: Arc::new(Mutex::new(Vec::new())),
            uninstall_calls: Arc::new(Mutex::new(Vec::new())),
            install_error: Arc::new(Mutex::new(None)),
            uninstall_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Make every `upgrade_install` fail with the given message.
    pub fn fail_installs(&self, message: impl Into<String>) {
        *self.install_error.lock().unwrap() = Some(message.into());
    }

    /// Make every `uninstall` fail with the given message.
    pub fn fail_uninstalls(&self, message: impl Into<String>) {
        *self.uninstall_error.lock().unwrap() = Some(message.into());
    }

    /// Clear any scripted failures.
    pub fn succeed(&self) {
        *self.install_error.lock().unwrap() = None;
        *self.uninstall_error.lock().unwrap() = None;
    }

    pub fn install_calls(&self) -> Vec<InstallCall> {
        self.install_calls.lock().unwrap().clone()
    }

    /// Recorded `(release_name, namespace)` pairs.
    pub fn uninstall_calls(&self) -> Vec<(String, String)> {
        self.uninstall_calls.lock().unwrap().clone()
    }

    fn failure(message: &str) -> CommandError {
        CommandError::Failed {
            tool: "helm",
            command: "helm (mock)".to_string(),
            stdout: String::new(),
            stderr: message.to_string(),
        }
    }
}

impl Default for MockHelmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseHelmClient for MockHelmClient {
    async fn upgrade_install(
        &self,
        release_name: &str,
        namespace: &str,
        chart_path: &str,
        values: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<(), CommandError> {
        self.install_calls.lock().unwrap().push(InstallCall {
            release_name: release_name.to_string(),
            namespace: namespace.to_string(),
            chart_path: chart_path.to_string(),
            values: values.clone(),
        });
        match self.install_error.lock().unwrap().as_deref() {
            Some(message) => Err(Self::failure(message)),
            None => Ok(()),
        }
    }

    async fn uninstall(
        &self,
        release_name: &str,
        namespace: &str,
        _timeout: Duration,
    ) -> Result<(), CommandError> {
        self.uninstall_calls
            .lock()
            .unwrap()
            .push((release_name.to_string(), namespace.to_string()));
        match self.uninstall_error.lock().unwrap().as_deref() {
            Some(message) => Err(Self::failure(message)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Mock Kube Client
// =============================================================================

pub struct MockKubeClient {
    deleted_namespaces: Arc<Mutex<Vec<String>>>,
    delete_error: Arc<Mutex<Option<String>>>,
    secrets: Arc<Mutex<HashMap<(String, String, String), String>>>,
}

impl MockKubeClient {
    pub fn new() -> Self {
        Self {
            deleted_namespaces: Arc::new(Mutex::new(Vec::new())),
            delete_error: Arc::new(Mutex::new(None)),
            secrets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make every `delete_namespace` fail with the given message.
    pub fn fail_deletes(&self, message: impl Into<String>) {
        *self.delete_error.lock().unwrap() = Some(message.into());
    }

    /// Clear any scripted failures.
    pub fn succeed(&self) {
        *self.delete_error.lock().unwrap() = None;
    }

    /// Seed a secret value for `read_secret_value`.
    pub fn with_secret(
        self,
        namespace: &str,
        secret_name: &str,
        key: &str,
        value: &str,
    ) -> Self {
        self.secrets.lock().unwrap().insert(
            (
                namespace.to_string(),
                secret_name.to_string(),
                key.to_string(),
            ),
            value.to_string(),
        );
        self
    }

    pub fn deleted_namespaces(&self) -> Vec<String> {
        self.deleted_namespaces.lock().unwrap().clone()
    }
}

impl Default for MockKubeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseKubeClient for MockKubeClient {
    async fn delete_namespace(&self, namespace: &str) -> Result<(), CommandError> {
        self.deleted_namespaces
            .lock()
            .unwrap()
            .push(namespace.to_string());
        match self.delete_error.lock().unwrap().as_deref() {
            Some(message) => Err(CommandError::Failed {
                tool: "kubectl",
                command: "kubectl (mock)".to_string(),
                stdout: String::new(),
                stderr: message.to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn read_secret_value(
        &self,
        namespace: &str,
        secret_name: &str,
        key: &str,
    ) -> Result<String, CommandError> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(
                namespace.to_string(),
                secret_name.to_string(),
                key.to_string(),
            ))
            .cloned()
            .ok_or_else(|| CommandError::SecretKeyMissing {
                secret_name: secret_name.to_string(),
                key: key.to_string(),
            })
    }
}

// =============================================================================
// Mock Readiness Probe
// =============================================================================

pub struct MockReadinessProbe {
    probed_urls: Arc<Mutex<Vec<String>>>,
    time_out: Arc<Mutex<bool>>,
}

impl MockReadinessProbe {
    pub fn new() -> Self {
        Self {
            probed_urls: Arc::new(Mutex::new(Vec::new())),
            time_out: Arc::new(Mutex::new(false)),
        }
    }

    /// Make every probe report a timeout instead of success.
    pub fn always_time_out(&self) {
        *self.time_out.lock().unwrap() = true;
    }

    pub fn probed_urls(&self) -> Vec<String> {
        self.probed_urls.lock().unwrap().clone()
    }
}

impl Default for MockReadinessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseReadinessProbe for MockReadinessProbe {
    async fn wait_for_http_ok(
        &self,
        url: &str,
        _timeout: Duration,
        _poll: Duration,
    ) -> Result<(), ReadinessError> {
        self.probed_urls.lock().unwrap().push(url.to_string());
        if *self.time_out.lock().unwrap() {
            Err(ReadinessError::Timeout {
                last_error: "connection refused (mock)".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// TestDependencies bundle
// =============================================================================

/// Bundle of mock adapters plus accessors for assertions.
///
/// Clone is shallow: the clones share call logs with the kernel built from
/// them, so tests keep visibility after `into_kernel`.
#[derive(Clone)]
pub struct TestDependencies {
    pub helm: Arc<MockHelmClient>,
    pub kube: Arc<MockKubeClient>,
    pub readiness: Arc<MockReadinessProbe>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            helm: Arc::new(MockHelmClient::new()),
            kube: Arc::new(MockKubeClient::new()),
            readiness: Arc::new(MockReadinessProbe::new()),
        }
    }

    /// Build a ServerKernel backed by these mocks.
    pub fn into_kernel(self, db_pool: PgPool) -> ServerKernel {
        ServerKernel::new(db_pool, self.helm, self.kube, self.readiness)
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
