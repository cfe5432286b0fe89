// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (like "provision a store") should be worker/domain functions
// that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseHelmClient)

use std::time::Duration;

use async_trait::async_trait;

use super::error::{CommandError, ReadinessError};

// =============================================================================
// Helm Trait (Infrastructure - cluster package manager)
// =============================================================================

#[async_trait]
pub trait BaseHelmClient: Send + Sync {
    /// Install or upgrade a release, creating the namespace if missing.
    ///
    /// `values` is serialized and piped to `-f -`. Blocks until the release
    /// is ready or the timeout expires.
    async fn upgrade_install(
        &self,
        release_name: &str,
        namespace: &str,
        chart_path: &str,
        values: &serde_json::Value,
        timeout: Duration,
    ) -> Result<(), CommandError>;

    /// Uninstall a release, blocking until removal or timeout.
    async fn uninstall(
        &self,
        release_name: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<(), CommandError>;
}

// =============================================================================
// Cluster CLI Trait (Infrastructure - kubectl)
// =============================================================================

#[async_trait]
pub trait BaseKubeClient: Send + Sync {
    /// Delete a namespace. Idempotent: succeeds if the namespace is already
    /// absent.
    async fn delete_namespace(&self, namespace: &str) -> Result<(), CommandError>;

    /// Read and decode a single key out of a namespaced secret.
    async fn read_secret_value(
        &self,
        namespace: &str,
        secret_name: &str,
        key: &str,
    ) -> Result<String, CommandError>;
}

// =============================================================================
// Readiness Trait (Infrastructure - HTTP probe)
// =============================================================================

#[async_trait]
pub trait BaseReadinessProbe: Send + Sync {
    /// Poll `url` until the first response with status < 500, or fail with
    /// [`ReadinessError::Timeout`] when the deadline expires.
    async fn wait_for_http_ok(
        &self,
        url: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), ReadinessError>;
}
