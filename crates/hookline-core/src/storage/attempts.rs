//! Repository for the delivery attempt audit log.
//!
//! Attempts are written by workers inside the claim transaction (see
//! [`ClaimedBatch`](crate::storage::claim::ClaimedBatch)); this repository
//! only reads them back for the lookup API and for invariant checks.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{DeliveryAttempt, EventId},
};

/// Repository for delivery attempt database operations.
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

    /// Finds all attempts for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_event(&self, event_id: EventId) -> Result<Vec<DeliveryAttempt>> {
        let attempts = sqlx::query_as::<_, DeliveryAttempt>(
            r"
            SELECT id, event_id, attempt_number, status_code, response_body, error, created_at
            FROM delivery_attempts
            WHERE event_id = $1
            ORDER BY attempt_number ASC
            ",
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(attempts)
    }

    /// Counts the attempts recorded for an event.
    ///
    /// Matches the event's `attempt_count` whenever the queue invariants
    /// hold; used by integration tests to verify exactly that.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_for_event(&self, event_id: EventId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM delivery_attempts WHERE event_id = $1")
                .bind(event_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count)
    }
}
