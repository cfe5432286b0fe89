//! Append-only audit line per store.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct StoreEvent {
    pub id: i64,
    pub store_id: Uuid,
    pub event_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl StoreEvent {
    /// Append one event. Events are never mutated afterwards.
    pub async fn log(
        store_id: Uuid,
        event_type: &str,
        message: &str,
        db: impl PgExecutor<'_>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO store_events (store_id, event_type, message)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(store_id)
        .bind(event_type)
        .bind(message)
        .fetch_one(db)
        .await
        .map_err(Into::into)
    }

    /// Latest events for one store, newest first (detail view).
    pub async fn find_recent_for_store(
        store_id: Uuid,
        limit: i64,
        db: impl PgExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM store_events
             WHERE store_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(store_id)
        .bind(limit)
        .fetch_all(db)
        .await
        .map_err(Into::into)
    }
}
