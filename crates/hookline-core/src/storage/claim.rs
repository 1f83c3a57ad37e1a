//! Claimed batch: the unit of the claim/dispatch/record protocol.
//!
//! A [`ClaimedBatch`] owns the transaction opened by
//! [`events::Repository::claim_batch`](crate::storage::events::Repository::claim_batch)
//! and is the only way to record delivery outcomes. Each outcome writes the
//! attempt audit row and the event transition together, so either both
//! become durable at commit or neither does. Dropping the batch without
//! committing rolls everything back and the rows return to the queue.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{EventId, WebhookEvent},
};

/// What happens to an event after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Keep the event `pending` and make it eligible again at the given
    /// time.
    Retry {
        /// Earliest time of the next delivery attempt.
        next_retry_at: DateTime<Utc>,
    },

    /// Retries exhausted; transition to the terminal `dead` state.
    Dead,
}

/// A set of claimed events plus the transaction that locks them.
///
/// The worker processes the events one by one, recording each outcome
/// through this batch, then commits. Attempts for an event are strictly
/// serialized because the row lock is held for the whole batch.
pub struct ClaimedBatch {
    tx: Transaction<'static, Postgres>,
    events: Vec<WebhookEvent>,
}

impl ClaimedBatch {
    pub(crate) fn new(tx: Transaction<'static, Postgres>, events: Vec<WebhookEvent>) -> Self {
        Self { tx, events }
    }

    /// Number of events claimed in this batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Takes ownership of the claimed events for processing.
    pub fn take_events(&mut self) -> Vec<WebhookEvent> {
        std::mem::take(&mut self.events)
    }

    /// Records a successful delivery.
    ///
    /// Inserts the attempt row and transitions the event to `delivered` in
    /// the claim transaction: `attempt_count` is set to `attempt_number`,
    /// `last_error` is cleared.
    ///
    /// # Errors
    ///
    /// Returns error if either write fails; the caller should drop the
    /// batch so the transaction rolls back.
    pub async fn record_success(
        &mut self,
        event_id: EventId,
        attempt_number: i32,
        status_code: u16,
        response_body: Option<&str>,
    ) -> Result<()> {
        self.insert_attempt(
            event_id,
            attempt_number,
            Some(i32::from(status_code)),
            response_body,
            None,
        )
        .await?;

        sqlx::query(
            r"
            UPDATE webhook_events
            SET status = 'delivered', attempt_count = $2, last_error = NULL, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(event_id)
        .bind(attempt_number)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Records a failed delivery.
    ///
    /// Inserts the attempt row (with either `status_code` or `error`
    /// populated), advances `attempt_count` to `attempt_number`, stores
    /// `last_error`, and applies the disposition: reschedule as `pending`
    /// or retire as `dead`.
    ///
    /// # Errors
    ///
    /// Returns error if either write fails.
    pub async fn record_failure(
        &mut self,
        event_id: EventId,
        attempt_number: i32,
        status_code: Option<u16>,
        response_body: Option<&str>,
        error: Option<&str>,
        last_error: &str,
        disposition: FailureDisposition,
    ) -> Result<()> {
        self.insert_attempt(
            event_id,
            attempt_number,
            status_code.map(i32::from),
            response_body,
            error,
        )
        .await?;

        match disposition {
            FailureDisposition::Retry { next_retry_at } => {
                sqlx::query(
                    r"
                    UPDATE webhook_events
                    SET status = 'pending', attempt_count = $2, next_retry_at = $3,
                        last_error = $4, updated_at = NOW()
                    WHERE id = $1
                    ",
                )
                .bind(event_id)
                .bind(attempt_number)
                .bind(next_retry_at)
                .bind(last_error)
                .execute(&mut *self.tx)
                .await?;
            },
            FailureDisposition::Dead => {
                sqlx::query(
                    r"
                    UPDATE webhook_events
                    SET status = 'dead', attempt_count = $2, next_retry_at = NULL,
                        last_error = $3, updated_at = NOW()
                    WHERE id = $1
                    ",
                )
                .bind(event_id)
                .bind(attempt_number)
                .bind(last_error)
                .execute(&mut *self.tx)
                .await?;
            },
        }

        Ok(())
    }

    /// Commits the claim transaction, durably publishing every recorded
    /// outcome and releasing the row locks.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; all outcomes roll back.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn insert_attempt(
        &mut self,
        event_id: EventId,
        attempt_number: i32,
        status_code: Option<i32>,
        response_body: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO delivery_attempts
                (id, event_id, attempt_number, status_code, response_body, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ",
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(attempt_number)
        .bind(status_code)
        .bind(response_body)
        .bind(error)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}
