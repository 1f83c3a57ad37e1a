//! Test infrastructure for the hookline workspace.
//!
//! Provides per-test isolated databases, a deterministic clock, and fixture
//! helpers so integration tests exercise the production storage layer
//! against real PostgreSQL. Database-backed tests require a reachable
//! server via `TEST_DATABASE_URL` (or `DATABASE_URL`); suites mark them
//! `#[ignore]` so the rest of the tests run without one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hookline_core::{
    storage::{run_migrations, Storage},
    DeliveryAttempt, EventId, WebhookEvent,
};
use sqlx::PgPool;

pub mod database;
pub mod time;

pub use database::TestDatabase;
pub use time::TestClock;

/// Test environment with an isolated database and deterministic clock.
pub struct TestEnv {
    /// Deterministic clock for time-based testing.
    pub clock: TestClock,
    storage: Arc<Storage>,
    // Held for its Drop impl, which removes the database.
    database: TestDatabase,
}

impl TestEnv {
    /// Creates a test environment backed by a freshly created database with
    /// the queue schema applied.
    ///
    /// # Errors
    ///
    /// Returns error if no PostgreSQL server is reachable or migrations
    /// fail.
    pub async fn new() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
            )
            .with_test_writer()
            .try_init();

        let database = TestDatabase::new().await.context("failed to create test database")?;
        run_migrations(database.pool()).await.context("failed to apply schema")?;

        let storage = Arc::new(Storage::new(database.pool().clone()));
        let clock = TestClock::new();

        Ok(Self { clock, storage, database })
    }

    /// Returns the connection pool for this environment's database.
    pub fn pool(&self) -> &PgPool {
        self.database.pool()
    }

    /// Returns the storage layer over this environment's database.
    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Inserts a pending event and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn insert_event(
        &self,
        payload: serde_json::Value,
        target_url: &str,
    ) -> Result<EventId> {
        Ok(self.storage.events.insert(&payload, target_url).await?)
    }

    /// Fetches an event that must exist.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or the event is missing.
    pub async fn event(&self, id: EventId) -> Result<WebhookEvent> {
        self.storage
            .events
            .find(id)
            .await?
            .with_context(|| format!("event {id} not found"))
    }

    /// Fetches the attempt audit rows for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn attempts(&self, id: EventId) -> Result<Vec<DeliveryAttempt>> {
        Ok(self.storage.attempts.find_by_event(id).await?)
    }

    /// Rewrites an event's `next_retry_at` into the past so it is
    /// immediately claimable, regardless of its backoff schedule.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn make_due(&self, id: EventId) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET next_retry_at = NOW() - INTERVAL '1 second' WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Polls until the event reaches a terminal state or the timeout
    /// expires, returning the final row.
    ///
    /// # Errors
    ///
    /// Returns error if the timeout expires first.
    pub async fn wait_for_terminal(&self, id: EventId, timeout: Duration) -> Result<WebhookEvent> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let event = self.event(id).await?;
            if event.status.is_terminal() {
                return Ok(event);
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "event {id} still {} after {timeout:?} ({} attempts)",
                    event.status,
                    event.attempt_count
                );
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
