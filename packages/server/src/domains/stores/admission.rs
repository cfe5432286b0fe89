//! Admission service: translates create/delete requests into atomic
//! insertions of (store row, job row, event row).
//!
//! The admission path never performs side effects against the cluster; it
//! only persists durable work for the provisioning worker.

use anyhow::Result;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::models::{Store, StoreEngine, StoreEvent, StoreStatus};
use super::rate_limit::RateLimiter;
use crate::config::Config;
use crate::kernel::jobs::{JobAction, ProvisioningJob};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("rate limit exceeded, try again later")]
    RateLimited,

    #[error("medusa is intentionally disabled, please choose woocommerce")]
    UnsupportedEngine,

    #[error("maximum active store limit reached")]
    CapacityExhausted,

    #[error("store not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// What the caller gets back after a request is durably queued.
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    pub store_id: Uuid,
    pub status: StoreStatus,
    pub namespace: String,
    pub queued_job_id: Uuid,
}

pub struct AdmissionService {
    pool: PgPool,
    limiter: RateLimiter,
    max_active_stores: i64,
    job_max_attempts: i32,
}

impl AdmissionService {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            limiter: RateLimiter::new(
                config.rate_limit_create_delete_per_window,
                config.rate_limit_window_seconds,
            ),
            max_active_stores: config.max_active_stores,
            job_max_attempts: config.worker_max_attempts,
        }
    }

    /// Queue provisioning of a new store.
    ///
    /// One transaction inserts the store, its PROVISION job, and the
    /// "queued" event; a partial failure leaves no orphan rows.
    pub async fn create_store(
        &self,
        engine: StoreEngine,
        display_name: Option<String>,
        caller_identity: &str,
    ) -> Result<EnqueueReceipt, AdmissionError> {
        let (allowed, remaining) = self
            .limiter
            .allow(&format!("create:{caller_identity}"), &self.pool)
            .await?;
        if !allowed {
            return Err(AdmissionError::RateLimited);
        }

        if engine == StoreEngine::Medusa {
            return Err(AdmissionError::UnsupportedEngine);
        }

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        if Store::count_active(&mut *tx).await? >= self.max_active_stores {
            return Err(AdmissionError::CapacityExhausted);
        }

        let store_id = Uuid::new_v4();
        let namespace = format!("store-{store_id}");

        let store = Store::builder()
            .id(store_id)
            .engine(engine)
            .display_name(display_name)
            .namespace(namespace.clone())
            .release_name(namespace.clone())
            .status(StoreStatus::Queued)
            .build();
        let store = store.insert(&mut *tx).await?;

        let job = ProvisioningJob::builder()
            .store_id(store.id)
            .action(JobAction::Provision)
            .max_attempts(self.job_max_attempts)
            .build();
        let job = job.insert(&mut *tx).await?;

        StoreEvent::log(
            store.id,
            "queued",
            &format!("Provisioning queued. Rate remaining: {remaining}"),
            &mut *tx,
        )
        .await?;

        tx.commit().await.map_err(anyhow::Error::from)?;
        tracing::info!(store_id = %store.id, job_id = %job.id, "store provisioning queued");

        Ok(EnqueueReceipt {
            store_id: store.id,
            status: store.status,
            namespace: store.namespace,
            queued_job_id: job.id,
        })
    }

    /// Queue teardown of a store.
    ///
    /// Idempotent: if teardown was already requested and a DELETE job
    /// exists, the latest one is returned without new rows. Otherwise any
    /// QUEUED PROVISION jobs are cancelled and a DELETE job is inserted, all
    /// in one transaction.
    pub async fn delete_store(
        &self,
        store_id: Uuid,
        caller_identity: &str,
    ) -> Result<EnqueueReceipt, AdmissionError> {
        let (allowed, _) = self
            .limiter
            .allow(&format!("delete:{caller_identity}"), &self.pool)
            .await?;
        if !allowed {
            return Err(AdmissionError::RateLimited);
        }

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let store = Store::find_by_id(store_id, &mut *tx)
            .await?
            .ok_or(AdmissionError::NotFound)?;

        if store.status.is_teardown() {
            if let Some(existing) =
                ProvisioningJob::find_latest_delete_for_store(store.id, &mut *tx).await?
            {
                return Ok(EnqueueReceipt {
                    store_id: store.id,
                    status: StoreStatus::Deleting,
                    namespace: store.namespace,
                    queued_job_id: existing.id,
                });
            }
        }

        Store::set_status(store.id, StoreStatus::Deleting, &mut *tx).await?;

        // Cancel queued provision retries once teardown is requested to
        // avoid stale queue work.
        ProvisioningJob::cancel_queued_provisions(store.id, &mut *tx).await?;

        let job = ProvisioningJob::builder()
            .store_id(store.id)
            .action(JobAction::Delete)
            .max_attempts(self.job_max_attempts)
            .build();
        let job = job.insert(&mut *tx).await?;

        StoreEvent::log(store.id, "delete_queued", "Teardown queued", &mut *tx).await?;

        tx.commit().await.map_err(anyhow::Error::from)?;
        tracing::info!(store_id = %store.id, job_id = %job.id, "store teardown queued");

        Ok(EnqueueReceipt {
            store_id: store.id,
            status: StoreStatus::Deleting,
            namespace: store.namespace,
            queued_job_id: job.id,
        })
    }
}
