//! Test fixtures for creating test data.

use anyhow::Result;
use chrono::{DateTime, Utc};
use server_core::domains::stores::models::{Store, StoreEngine, StoreStatus};
use server_core::kernel::jobs::{JobAction, JobStatus, ProvisioningJob};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a store in the given lifecycle state.
pub async fn create_test_store(pool: &PgPool, status: StoreStatus) -> Result<Store> {
    let id = Uuid::new_v4();
    let namespace = format!("store-{id}");
    let store = Store::builder()
        .id(id)
        .engine(StoreEngine::Woocommerce)
        .namespace(namespace.clone())
        .release_name(namespace)
        .status(status)
        .build();
    store.insert(pool).await
}

/// Insert a job for a store in the given state.
pub async fn create_test_job(
    pool: &PgPool,
    store_id: Uuid,
    action: JobAction,
    status: JobStatus,
) -> Result<ProvisioningJob> {
    let job = ProvisioningJob::builder()
        .store_id(store_id)
        .action(action)
        .status(status)
        .build();
    job.insert(pool).await
}

/// Force a job into a leased state with a specific lease timestamp.
///
/// Used to simulate crashed workers whose leases have gone stale.
pub async fn force_lease(
    pool: &PgPool,
    job_id: Uuid,
    locked_by: &str,
    locked_at: Option<DateTime<Utc>>,
    attempt: i32,
) -> Result<()> {
    sqlx::query(
        "UPDATE provisioning_jobs
         SET status = 'IN_PROGRESS', locked_by = $2, locked_at = $3, attempt = $4
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(locked_by)
    .bind(locked_at)
    .bind(attempt)
    .execute(pool)
    .await?;
    Ok(())
}

/// Push a rate-limit bucket's window start back in time.
pub async fn backdate_rate_limit_window(
    pool: &PgPool,
    key: &str,
    window_started_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE rate_limit_buckets SET window_started_at = $2 WHERE key = $1")
        .bind(key)
        .bind(window_started_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_store(pool: &PgPool, id: Uuid) -> Result<Store> {
    Ok(Store::find_by_id(id, pool)
        .await?
        .expect("store should exist"))
}

pub async fn fetch_job(pool: &PgPool, id: Uuid) -> Result<ProvisioningJob> {
    Ok(ProvisioningJob::find_by_id(id, pool)
        .await?
        .expect("job should exist"))
}

/// Event types for a store in insertion order.
pub async fn event_types(pool: &PgPool, store_id: Uuid) -> Result<Vec<String>> {
    let types = sqlx::query_scalar::<_, String>(
        "SELECT event_type FROM store_events WHERE store_id = $1 ORDER BY id ASC",
    )
    .bind(store_id)
    .fetch_all(pool)
    .await?;
    Ok(types)
}

pub async fn count_events(pool: &PgPool, store_id: Uuid, event_type: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM store_events WHERE store_id = $1 AND event_type = $2",
    )
    .bind(store_id)
    .bind(event_type)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Jobs for a store, oldest first.
pub async fn jobs_for_store(pool: &PgPool, store_id: Uuid) -> Result<Vec<ProvisioningJob>> {
    let jobs = sqlx::query_as::<_, ProvisioningJob>(
        "SELECT * FROM provisioning_jobs WHERE store_id = $1 ORDER BY created_at ASC",
    )
    .bind(store_id)
    .fetch_all(pool)
    .await?;
    Ok(jobs)
}

/// Jobs violating the lease invariant: IN_PROGRESS without a full lease.
pub async fn count_leaseless_in_progress(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM provisioning_jobs
         WHERE status = 'IN_PROGRESS' AND (locked_by IS NULL OR locked_at IS NULL)",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}
