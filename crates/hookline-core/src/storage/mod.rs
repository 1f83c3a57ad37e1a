//! Database access layer implementing the repository pattern.
//!
//! The repository layer translates between domain models and the SQL
//! schema. All database operations MUST go through these repositories;
//! direct SQL outside this module is forbidden to keep the claim protocol
//! and the queue invariants in one place.

use std::sync::Arc;

use sqlx::PgPool;

pub mod attempts;
pub mod claim;
pub mod events;

pub use claim::{ClaimedBatch, FailureDisposition};

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for queued webhook events.
    pub events: Arc<events::Repository>,

    /// Repository for the delivery attempt audit log.
    pub attempts: Arc<attempts::Repository>,
}

impl Storage {
    /// Creates a new storage instance over a shared connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            events: Arc::new(events::Repository::new(pool.clone())),
            attempts: Arc::new(attempts::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.events.pool()).await?;

        Ok(())
    }
}

/// Creates the queue schema if it does not exist yet.
///
/// Statements are idempotent so both the service binary and the test
/// harness can run them unconditionally at startup. The partial index on
/// `(status, next_retry_at)` keeps the claim query cheap once the table
/// accumulates terminal rows.
///
/// # Errors
///
/// Returns `CoreError::Database` if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS webhook_events (
            id UUID PRIMARY KEY,
            payload JSONB NOT NULL,
            target_url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            next_retry_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS delivery_attempts (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES webhook_events(id) ON DELETE CASCADE,
            attempt_number INTEGER NOT NULL,
            status_code INTEGER,
            response_body TEXT,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (event_id, attempt_number)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_webhook_events_ready
        ON webhook_events (status, next_retry_at)
        WHERE status = 'pending'
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}
