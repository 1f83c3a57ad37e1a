//! Repository for webhook event queue operations.
//!
//! Owns inserts, point reads, and the concurrent claim protocol. Claiming
//! uses `FOR UPDATE SKIP LOCKED` so multiple workers polling the same table
//! never hand out the same row twice.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{EventId, WebhookEvent},
    storage::claim::ClaimedBatch,
};

const EVENT_COLUMNS: &str = "id, payload, target_url, status, attempt_count, last_error, \
                             next_retry_at, created_at, updated_at";

/// Repository for webhook event database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a new pending event and returns its ID.
    ///
    /// `next_retry_at` is set to the insertion time so the row is
    /// immediately eligible for claiming and sorts after already-due
    /// retries.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn insert(&self, payload: &serde_json::Value, target_url: &str) -> Result<EventId> {
        let id = EventId::new();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO webhook_events
                (id, payload, target_url, status, attempt_count, next_retry_at, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $4, $4)
            ",
        )
        .bind(id)
        .bind(sqlx::types::Json(payload))
        .bind(target_url)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Point read for external lookup.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails. A missing row is `Ok(None)`.
    pub async fn find(&self, id: EventId) -> Result<Option<WebhookEvent>> {
        let event = sqlx::query_as::<_, WebhookEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Atomically claims up to `batch_size` due pending events.
    ///
    /// Opens a transaction and selects rows with `FOR UPDATE SKIP LOCKED`:
    /// rows locked by another worker's claim are skipped rather than waited
    /// on, so concurrent pollers partition the ready set between them. The
    /// returned batch holds the open transaction; claimed rows belong to the
    /// caller until it commits or rolls back. If the process dies mid-batch
    /// the transaction rolls back and the rows become claimable again with
    /// their state untouched.
    ///
    /// Rows are ordered by `next_retry_at` ascending (most overdue first); a
    /// NULL `next_retry_at` is treated as immediately due.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction or the select fails.
    pub async fn claim_batch(&self, batch_size: usize) -> Result<Option<ClaimedBatch>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let events = sqlx::query_as::<_, WebhookEvent>(&format!(
            r"
            SELECT {EVENT_COLUMNS} FROM webhook_events
            WHERE status = 'pending'
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
            ORDER BY next_retry_at ASC NULLS FIRST
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "
        ))
        .bind(now)
        .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await?;

        if events.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }

        Ok(Some(ClaimedBatch::new(tx, events)))
    }
}
