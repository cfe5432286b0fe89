//! Provisioning worker: the long-running service driving all async work.
//!
//! The worker:
//! - Recovers stale leases once at startup
//! - Polls the database, leasing the oldest QUEUED job per free slot
//! - Runs each job on its own task, bounded by `worker_max_concurrency`
//! - Commits every state transition in its own transaction so progress is
//!   visible while external commands run
//!
//! Shutdown is cooperative: cancelling the token stops the scheduler on its
//! next turn and drains in-flight tasks. An abandoned job keeps its expired
//! lease and is requeued by the next process's startup sweep.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{JobAction, JobStatus, ProvisioningJob};
use crate::config::Config;
use crate::domains::stores::models::{Store, StoreEngine, StoreEvent, StoreStatus};
use crate::kernel::ServerKernel;

pub struct ProvisioningWorker {
    kernel: Arc<ServerKernel>,
    config: Arc<Config>,
    shutdown: CancellationToken,
}

impl ProvisioningWorker {
    pub fn new(kernel: Arc<ServerKernel>, config: Arc<Config>) -> Self {
        Self {
            kernel,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token to cancel for graceful shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requeue jobs whose lease expired (crashed or abandoned workers).
    ///
    /// Runs once before the polling loop. Attempt counters are preserved so
    /// recovered jobs still count toward `max_attempts`.
    pub async fn recover_stale_leases(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.worker_lease_seconds);
        let recovered =
            ProvisioningJob::recover_stale_leases(cutoff, &self.kernel.db_pool).await?;
        if recovered > 0 {
            warn!(recovered, "requeued jobs with stale leases");
        }
        Ok(recovered)
    }

    /// Lease and process at most one job. Returns the processed job id.
    ///
    /// Deterministic single-step variant of the polling loop; the service
    /// path is [`ProvisioningWorker::run`].
    pub async fn run_next_job(&self) -> Result<Option<Uuid>> {
        match ProvisioningJob::lease_next(&self.config.worker_id, &self.kernel.db_pool).await? {
            Some(job) => {
                debug!(job_id = %job.id, action = ?job.action, attempt = job.attempt, "leased job");
                process_job(Arc::clone(&self.kernel), Arc::clone(&self.config), job.id).await;
                Ok(Some(job.id))
            }
            None => Ok(None),
        }
    }

    /// Lease and process QUEUED jobs sequentially until none remain.
    pub async fn run_ready_jobs(&self) -> Result<usize> {
        let mut processed = 0;
        while self.run_next_job().await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Run the worker until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            max_concurrency = self.config.worker_max_concurrency,
            poll_seconds = self.config.worker_poll_seconds,
            "provisioning worker starting"
        );

        self.recover_stale_leases().await?;

        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Prune finished tasks, then fill the free slots.
            while in_flight.try_join_next().is_some() {}

            let free_slots = self
                .config
                .worker_max_concurrency
                .saturating_sub(in_flight.len());
            for _ in 0..free_slots {
                match ProvisioningJob::lease_next(&self.config.worker_id, &self.kernel.db_pool)
                    .await
                {
                    Ok(Some(job)) => {
                        debug!(job_id = %job.id, action = ?job.action, attempt = job.attempt, "leased job");
                        let kernel = Arc::clone(&self.kernel);
                        let config = Arc::clone(&self.config);
                        in_flight.spawn(async move {
                            process_job(kernel, config, job.id).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "failed to lease next job");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.worker_poll_seconds)) => {}
            }
        }

        // Drain in-flight work; anything still running after the grace period
        // keeps its lease and is recovered by the next startup sweep.
        if !in_flight.is_empty() {
            info!(count = in_flight.len(), "waiting for in-flight jobs to finish");
            let drain = async {
                while in_flight.join_next().await.is_some() {}
            };
            let _ = tokio::time::timeout(Duration::from_secs(30), drain).await;
        }

        info!(worker_id = %self.config.worker_id, "provisioning worker stopped");
        Ok(())
    }
}

/// Process one leased job, logging instead of propagating outcome-write
/// failures (the lease expires and the job is retried either way).
async fn process_job(kernel: Arc<ServerKernel>, config: Arc<Config>, job_id: Uuid) {
    if let Err(error) = run_job(&kernel, &config, job_id).await {
        error!(job_id = %job_id, error = %error, "failed to persist job outcome");
    }
}

async fn run_job(kernel: &ServerKernel, config: &Config, job_id: Uuid) -> Result<()> {
    let pool = &kernel.db_pool;

    // Reload job and store together; short-circuit outcomes commit in the
    // same transaction as the reads.
    let mut tx = pool.begin().await?;

    let Some(job) = ProvisioningJob::find_by_id(job_id, &mut *tx).await? else {
        return Ok(());
    };

    let Some(store) = Store::find_by_id(job.store_id, &mut *tx).await? else {
        ProvisioningJob::complete(job.id, JobStatus::Failed, Some("store_not_found"), &mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(());
    };

    // If teardown was requested, any pending or leased provision job becomes
    // a no-op.
    if job.action == JobAction::Provision && store.status.is_teardown() {
        ProvisioningJob::complete(
            job.id,
            JobStatus::Succeeded,
            Some("provision_skipped_store_teardown_requested"),
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
        return Ok(());
    }

    // Delete is idempotent; if already deleted, mark the job complete.
    if job.action == JobAction::Delete && store.status == StoreStatus::Deleted {
        ProvisioningJob::complete(job.id, JobStatus::Succeeded, None, &mut *tx).await?;
        tx.commit().await?;
        return Ok(());
    }

    tx.commit().await?;

    let outcome = match job.action {
        JobAction::Provision => provision_store(kernel, config, &store).await,
        JobAction::Delete => teardown_store(kernel, config, &store).await,
    };

    match outcome {
        Ok(()) => {
            ProvisioningJob::complete(job.id, JobStatus::Succeeded, None, pool).await?;
            info!(job_id = %job.id, store_id = %store.id, action = ?job.action, "job succeeded");
        }
        Err(error) => {
            warn!(
                job_id = %job.id,
                store_id = %store.id,
                action = ?job.action,
                attempt = job.attempt,
                error = %error,
                "job failed"
            );
            record_job_failure(kernel, &job, &store, &error).await?;
        }
    }

    Ok(())
}

/// Commit the failure outcome: error records, retry or terminal transition,
/// and the "failed" event, all in one transaction.
async fn record_job_failure(
    kernel: &ServerKernel,
    job: &ProvisioningJob,
    store: &Store,
    error: &anyhow::Error,
) -> Result<()> {
    let message = error.to_string();
    let mut tx = kernel.db_pool.begin().await?;

    if job.attempts_exhausted() {
        ProvisioningJob::complete(job.id, JobStatus::Failed, Some(&message), &mut *tx).await?;
        // Teardown remains the terminal intent for DELETE: the store stays
        // DELETING and an operator retry reconverges.
        let store_status = match job.action {
            JobAction::Provision => StoreStatus::Failed,
            JobAction::Delete => StoreStatus::Deleting,
        };
        Store::set_status_and_error(store.id, store_status, &message, &mut *tx).await?;
    } else {
        ProvisioningJob::requeue_for_retry(job.id, &message, &mut *tx).await?;
        let store_status = match job.action {
            JobAction::Provision => StoreStatus::Queued,
            JobAction::Delete => StoreStatus::Deleting,
        };
        Store::set_status_and_error(store.id, store_status, &message, &mut *tx).await?;
    }

    StoreEvent::log(store.id, "failed", &message, &mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn provision_store(kernel: &ServerKernel, config: &Config, store: &Store) -> Result<()> {
    // Admission already refuses medusa; this guards against rows created
    // before the feature gate.
    if store.engine == StoreEngine::Medusa {
        bail!("Medusa is not enabled");
    }

    let pool = &kernel.db_pool;

    // Persist intermediate state early so the store does not remain stuck on
    // QUEUED while Helm work runs.
    {
        let mut tx = pool.begin().await?;
        Store::set_status(store.id, StoreStatus::Provisioning, &mut *tx).await?;
        StoreEvent::log(
            store.id,
            "install_started",
            "Starting Helm provisioning",
            &mut *tx,
        )
        .await?;
        tx.commit().await?;
    }

    let host = store_host(&store.id, &config.local_domain);
    let url = format!("http://{host}");
    let values = chart_values(config, store, &host);

    kernel
        .helm
        .upgrade_install(
            &store.release_name,
            &store.namespace,
            &config.helm_chart_path,
            &values,
            Duration::from_secs(config.helm_timeout_seconds),
        )
        .await?;

    if let Err(probe_error) = kernel
        .readiness
        .wait_for_http_ok(
            &url,
            Duration::from_secs(config.http_ready_timeout_seconds),
            Duration::from_secs(config.http_ready_poll_seconds),
        )
        .await
    {
        // Local ingress networking can be flaky; install success is
        // authoritative, so keep event visibility and continue.
        StoreEvent::log(
            store.id,
            "readiness_warning",
            &format!("HTTP check did not pass before timeout: {probe_error}"),
            pool,
        )
        .await?;
    }

    let mut tx = pool.begin().await?;
    Store::mark_ready(store.id, &url, &mut *tx).await?;
    StoreEvent::log(store.id, "ready", &format!("Store is ready at {url}"), &mut *tx).await?;
    tx.commit().await?;

    Ok(())
}

async fn teardown_store(kernel: &ServerKernel, config: &Config, store: &Store) -> Result<()> {
    let pool = &kernel.db_pool;

    // Persist intermediate state early so teardown progress is visible.
    {
        let mut tx = pool.begin().await?;
        Store::set_status(store.id, StoreStatus::Deleting, &mut *tx).await?;
        StoreEvent::log(store.id, "delete_started", "Delete requested", &mut *tx).await?;
        tx.commit().await?;
    }

    // Uninstall first; if the release is already absent this is a no-op.
    // Namespace delete below is the authoritative teardown, so uninstall
    // failures do not abort.
    if let Err(uninstall_error) = kernel
        .helm
        .uninstall(
            &store.release_name,
            &store.namespace,
            Duration::from_secs(config.helm_timeout_seconds),
        )
        .await
    {
        warn!(
            store_id = %store.id,
            error = %uninstall_error,
            "helm uninstall failed, continuing with namespace delete"
        );
    }

    kernel.kube.delete_namespace(&store.namespace).await?;

    let mut tx = pool.begin().await?;
    Store::mark_deleted(store.id, &mut *tx).await?;
    StoreEvent::log(
        store.id,
        "deleted",
        "Namespace and release removed",
        &mut *tx,
    )
    .await?;
    tx.commit().await?;

    Ok(())
}

// ============================================================================
// Chart values
// ============================================================================

fn store_host(store_id: &Uuid, local_domain: &str) -> String {
    format!("store-{store_id}.{local_domain}")
}

/// Nginx annotations enabling the guest page cache on the store ingress.
fn store_cache_annotations(config: &Config) -> serde_json::Value {
    let snippet = format!(
        "proxy_cache {zone};\nproxy_cache_valid 200 301 302 {ttl}s;\nproxy_cache_use_stale error timeout updating;\nadd_header X-Cache-Status $upstream_cache_status;",
        zone = config.store_guest_cache_zone,
        ttl = config.store_guest_cache_ttl_seconds,
    );
    json!({
        "nginx.ingress.kubernetes.io/proxy-buffering": "on",
        "nginx.ingress.kubernetes.io/configuration-snippet": snippet,
    })
}

fn store_ingress_values(config: &Config, host: &str) -> serde_json::Value {
    let mut ingress = json!({
        "enabled": true,
        "hostname": host,
        "ingressClassName": config.store_ingress_class,
    });
    if config.store_guest_cache_enabled {
        ingress["annotations"] = store_cache_annotations(config);
    }
    ingress
}

fn chart_values(config: &Config, store: &Store, host: &str) -> serde_json::Value {
    let blog_name = store
        .display_name
        .clone()
        .unwrap_or_else(|| format!("Store {}", &store.id.to_string()[..8]));
    json!({
        "store": {
            "id": store.id,
            "namespace": store.namespace,
            "host": host,
        },
        "wordpress": {
            "fullnameOverride": store.release_name,
            "wordpressBlogName": blog_name,
            "ingress": store_ingress_values(config, host),
        },
    })
}
