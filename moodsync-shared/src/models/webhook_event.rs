/// Ledger of processed Stripe webhook events
///
/// Stripe delivers at least once. An event id is recorded after its handler
/// succeeds, and a redelivered id is acknowledged without running again.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE stripe_webhook_events (
///     event_id VARCHAR(255) PRIMARY KEY,
///     event_type VARCHAR(100) NOT NULL,
///     processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StripeWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub processed_at: DateTime<Utc>,
}

impl StripeWebhookEvent {
    pub async fn exists(pool: &PgPool, event_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM stripe_webhook_events WHERE event_id = $1)")
            .bind(event_id)
            .fetch_one(pool)
            .await
    }

    /// Records an event as processed
    ///
    /// Returns false if the id was already recorded.
    pub async fn record(pool: &PgPool, event_id: &str, event_type: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO stripe_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes ledger entries older than `before`
    pub async fn prune(pool: &PgPool, before: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM stripe_webhook_events WHERE processed_at < $1")
            .bind(before)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}
