//! Fixed-window rate limiter backed by one bucket row per caller key.
//!
//! Each `allow` call is one short transaction. The increment path locks the
//! bucket row with SELECT ... FOR UPDATE so concurrent admission cannot lose
//! updates; the window is reset lazily on the first permitted call after it
//! expires.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RateLimitBucket {
    pub key: String,
    pub count: i32,
    pub window_started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct RateLimiter {
    max_requests: i32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: i32, window_seconds: i64) -> Self {
        Self {
            max_requests,
            window: Duration::seconds(window_seconds),
        }
    }

    /// Returns `(permitted, remaining)` for one request under `key`.
    pub async fn allow(&self, key: &str, pool: &PgPool) -> Result<(bool, i32)> {
        let mut tx = pool.begin().await?;

        // First caller for this key wins the insert; losers fall through to
        // the locked read below.
        let inserted = sqlx::query(
            "INSERT INTO rate_limit_buckets (key, count, window_started_at, updated_at)
             VALUES ($1, 1, NOW(), NOW())
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            tx.commit().await?;
            return Ok((true, self.max_requests - 1));
        }

        let bucket = sqlx::query_as::<_, RateLimitBucket>(
            "SELECT * FROM rate_limit_buckets WHERE key = $1 FOR UPDATE",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        if now - bucket.window_started_at > self.window {
            sqlx::query(
                "UPDATE rate_limit_buckets
                 SET count = 1, window_started_at = NOW(), updated_at = NOW()
                 WHERE key = $1",
            )
            .bind(key)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok((true, self.max_requests - 1));
        }

        if bucket.count >= self.max_requests {
            tx.rollback().await?;
            return Ok((false, 0));
        }

        sqlx::query(
            "UPDATE rate_limit_buckets
             SET count = count + 1, updated_at = NOW()
             WHERE key = $1",
        )
        .bind(key)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((true, self.max_requests - (bucket.count + 1)))
    }
}
