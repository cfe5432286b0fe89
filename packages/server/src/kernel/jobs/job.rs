//! Provisioning job model: one unit of async work against a store.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobAction {
    Provision,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Queued,
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal statuses carry a `completed_at` timestamp and are never
    /// leased again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(sqlx::FromRow, Debug, Clone, Serialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ProvisioningJob {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub store_id: Uuid,
    pub action: JobAction,

    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = 0)]
    pub attempt: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,

    // Lease: owned by `locked_by` for at most the engine's lease duration.
    #[builder(default, setter(strip_option))]
    pub locked_by: Option<String>,
    #[builder(default, setter(strip_option))]
    pub locked_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProvisioningJob {
    /// True once the current attempt was the last one allowed.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub async fn find_by_id(id: Uuid, db: impl PgExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM provisioning_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, db: impl PgExecutor<'_>) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO provisioning_jobs (
                id, store_id, action, status, attempt, max_attempts,
                locked_by, locked_at, error_message,
                created_at, updated_at, completed_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.store_id)
        .bind(self.action)
        .bind(self.status)
        .bind(self.attempt)
        .bind(self.max_attempts)
        .bind(&self.locked_by)
        .bind(self.locked_at)
        .bind(&self.error_message)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.completed_at)
        .fetch_one(db)
        .await
        .map_err(Into::into)
    }

    /// Lease the oldest QUEUED job for `worker_id`.
    ///
    /// The row lock with SKIP LOCKED gives multiple engine instances
    /// race-free FIFO dispatch without coordination beyond the database.
    /// Each lease grant increments `attempt`.
    pub async fn lease_next(worker_id: &str, db: impl PgExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM provisioning_jobs
                WHERE status = 'QUEUED'
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE provisioning_jobs
            SET
                status = 'IN_PROGRESS',
                locked_by = $1,
                locked_at = NOW(),
                attempt = attempt + 1,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_job)
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(db)
        .await
        .map_err(Into::into)
    }

    /// Requeue IN_PROGRESS jobs whose lease expired before `lease_cutoff`.
    ///
    /// The attempt counter is not reset: the next lease increments it again,
    /// so a crash-looping job still exhausts `max_attempts`.
    pub async fn recover_stale_leases(
        lease_cutoff: DateTime<Utc>,
        db: impl PgExecutor<'_>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE provisioning_jobs
             SET status = 'QUEUED', locked_by = NULL, locked_at = NULL, updated_at = NOW()
             WHERE status = 'IN_PROGRESS'
               AND (locked_at IS NULL OR locked_at < $1)",
        )
        .bind(lease_cutoff)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Write a terminal outcome. `note`, when present, replaces
    /// `error_message` (short-circuit markers and failure messages).
    pub async fn complete(
        id: Uuid,
        status: JobStatus,
        note: Option<&str>,
        db: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE provisioning_jobs
             SET status = $2,
                 error_message = COALESCE($3, error_message),
                 completed_at = NOW(),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(note)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Put a failed attempt back on the queue: lease cleared, attempt kept.
    pub async fn requeue_for_retry(
        id: Uuid,
        error_message: &str,
        db: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE provisioning_jobs
             SET status = 'QUEUED',
                 locked_by = NULL,
                 locked_at = NULL,
                 error_message = $2,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Latest DELETE job for a store, for idempotent re-delete responses.
    pub async fn find_latest_delete_for_store(
        store_id: Uuid,
        db: impl PgExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM provisioning_jobs
             WHERE store_id = $1 AND action = 'DELETE'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(store_id)
        .fetch_optional(db)
        .await
        .map_err(Into::into)
    }

    /// Fail every QUEUED PROVISION job of a store once teardown is requested.
    pub async fn cancel_queued_provisions(
        store_id: Uuid,
        db: impl PgExecutor<'_>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE provisioning_jobs
             SET status = 'FAILED',
                 error_message = 'provision_cancelled_delete_requested',
                 completed_at = COALESCE(completed_at, NOW()),
                 updated_at = NOW()
             WHERE store_id = $1 AND action = 'PROVISION' AND status = 'QUEUED'",
        )
        .bind(store_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}
