// ServerKernel - core infrastructure with all dependencies
//
// The ServerKernel holds all server dependencies (database, orchestrator
// adapters) and provides access via traits for testability.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use super::{
    BaseHelmClient, BaseKubeClient, BaseReadinessProbe, HelmClient, KubeClient, ReadinessProbe,
};
use crate::config::Config;

/// ServerKernel holds all server dependencies
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub helm: Arc<dyn BaseHelmClient>,
    pub kube: Arc<dyn BaseKubeClient>,
    pub readiness: Arc<dyn BaseReadinessProbe>,
}

impl ServerKernel {
    /// Creates a new ServerKernel with the given dependencies
    pub fn new(
        db_pool: PgPool,
        helm: Arc<dyn BaseHelmClient>,
        kube: Arc<dyn BaseKubeClient>,
        readiness: Arc<dyn BaseReadinessProbe>,
    ) -> Self {
        Self {
            db_pool,
            helm,
            kube,
            readiness,
        }
    }

    /// Creates a ServerKernel with the real process-exec adapters.
    pub fn with_process_adapters(db_pool: PgPool, config: &Config) -> Self {
        Self::new(
            db_pool,
            Arc::new(HelmClient::new(config.helm_binary.clone())),
            Arc::new(KubeClient::new(
                config.kubectl_binary.clone(),
                Duration::from_secs(config.kubectl_delete_timeout_seconds),
            )),
            Arc::new(ReadinessProbe::new()),
        )
    }
}
