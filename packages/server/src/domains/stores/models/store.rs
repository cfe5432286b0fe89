//! Store model - the tenant-visible resource.
//!
//! Stores are never hard-deleted: terminal DELETED rows remain as tombstones
//! so the event history stays reachable.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgExecutor;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "store_engine", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StoreEngine {
    #[default]
    Woocommerce,
    Medusa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "store_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    #[default]
    Queued,
    Provisioning,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

impl StoreStatus {
    /// Teardown has been requested or finished; provisioning work against
    /// the store becomes a no-op.
    pub fn is_teardown(&self) -> bool {
        matches!(self, StoreStatus::Deleting | StoreStatus::Deleted)
    }

    /// DELETED is the tombstone state: no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreStatus::Deleted)
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Store {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub engine: StoreEngine,
    // Setter takes Into<Option<String>> so admission can pass the request
    // field through unchanged.
    #[builder(default)]
    pub display_name: Option<String>,
    pub namespace: String,
    pub release_name: String,
    #[builder(default)]
    pub status: StoreStatus,
    #[builder(default, setter(strip_option))]
    pub url: Option<String>,
    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub async fn find_by_id(id: Uuid, db: impl PgExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM stores WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(Into::into)
    }

    /// All stores, newest first (list view).
    pub async fn list_all(db: impl PgExecutor<'_>) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM stores ORDER BY created_at DESC")
            .fetch_all(db)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, db: impl PgExecutor<'_>) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO stores (
                id, engine, display_name, namespace, release_name, status,
                url, last_error, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.engine)
        .bind(&self.display_name)
        .bind(&self.namespace)
        .bind(&self.release_name)
        .bind(self.status)
        .bind(&self.url)
        .bind(&self.last_error)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(db)
        .await
        .map_err(Into::into)
    }

    /// Count of stores occupying capacity: everything except FAILED and the
    /// DELETED tombstones.
    pub async fn count_active(db: impl PgExecutor<'_>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stores
             WHERE status IN ('QUEUED', 'PROVISIONING', 'READY', 'DELETING')",
        )
        .fetch_one(db)
        .await
        .map_err(Into::into)
    }

    // All status writes guard on status <> 'DELETED': the tombstone state
    // admits no further transitions, even from a racing worker.

    pub async fn set_status(
        id: Uuid,
        status: StoreStatus,
        db: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE stores SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status <> 'DELETED'",
        )
        .bind(id)
        .bind(status)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn set_status_and_error(
        id: Uuid,
        status: StoreStatus,
        last_error: &str,
        db: impl PgExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE stores SET status = $2, last_error = $3, updated_at = NOW()
             WHERE id = $1 AND status <> 'DELETED'",
        )
        .bind(id)
        .bind(status)
        .bind(last_error)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_ready(id: Uuid, url: &str, db: impl PgExecutor<'_>) -> Result<()> {
        sqlx::query(
            "UPDATE stores SET status = 'READY', url = $2, last_error = NULL, updated_at = NOW()
             WHERE id = $1 AND status <> 'DELETED'",
        )
        .bind(id)
        .bind(url)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_deleted(id: Uuid, db: impl PgExecutor<'_>) -> Result<()> {
        sqlx::query(
            "UPDATE stores SET status = 'DELETED', url = NULL, updated_at = NOW()
             WHERE id = $1 AND status <> 'DELETED'",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleting_and_deleted_count_as_teardown() {
        assert!(StoreStatus::Deleting.is_teardown());
        assert!(StoreStatus::Deleted.is_teardown());
        assert!(!StoreStatus::Queued.is_teardown());
        assert!(!StoreStatus::Provisioning.is_teardown());
        assert!(!StoreStatus::Ready.is_teardown());
        assert!(!StoreStatus::Failed.is_teardown());
    }

    #[test]
    fn only_deleted_is_terminal() {
        assert!(StoreStatus::Deleted.is_terminal());
        assert!(!StoreStatus::Deleting.is_terminal());
        assert!(!StoreStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_to_persisted_wire_strings() {
        assert_eq!(
            serde_json::to_string(&StoreStatus::Provisioning).unwrap(),
            "\"PROVISIONING\""
        );
        assert_eq!(
            serde_json::to_string(&StoreEngine::Woocommerce).unwrap(),
            "\"woocommerce\""
        );
    }

    #[test]
    fn engine_defaults_to_woocommerce() {
        assert_eq!(StoreEngine::default(), StoreEngine::Woocommerce);
    }
}
