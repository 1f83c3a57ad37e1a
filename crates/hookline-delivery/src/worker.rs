//! Worker engine driving the event state machine.
//!
//! Each worker runs a poll loop: claim due pending rows, deliver each one
//! with a signed POST, record the outcome through the claim transaction,
//! commit, sleep. The claim lock serializes attempts per event; the
//! long-transaction discipline means a crash anywhere between claim and
//! commit rolls the rows back to `pending` with their prior schedule, so
//! nothing is ever lost (at-least-once, not exactly-once: the in-flight
//! HTTP call may still have reached the receiver).

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use hookline_core::{
    storage::{ClaimedBatch, FailureDisposition, Storage},
    Clock, EventId, WebhookEvent,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient, Outcome},
    error::{DeliveryError, Result},
    retry::BackoffPolicy,
    signer,
    worker_pool::WorkerPool,
};

/// Pause after a storage error before the next poll, to avoid tight error
/// loops when the database is down.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,

    /// Maximum events to claim per batch.
    pub batch_size: usize,

    /// Sleep between polls when no work was found.
    pub poll_interval: Duration,

    /// Attempts before an event is retired as dead.
    pub max_attempts: u32,

    /// Shared HMAC secret for request signing. Must not be empty.
    pub secret: String,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Backoff schedule for failed deliveries.
    pub backoff: BackoffPolicy,

    /// Maximum time to wait for in-flight attempts on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(1500),
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            secret: String::new(),
            client_config: ClientConfig::default(),
            backoff: BackoffPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for engine monitoring.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Number of active delivery workers.
    pub active_workers: usize,
    /// Attempts completed since startup.
    pub events_processed: u64,
    /// Events that reached `delivered`.
    pub delivered: u64,
    /// Failed attempts that were rescheduled.
    pub retried: u64,
    /// Events retired as `dead`.
    pub dead: u64,
}

/// Result of one processed event, for stats accounting.
enum AttemptResult {
    Delivered,
    Retried,
    Dead,
}

/// Main delivery engine coordinating the worker pool.
pub struct DeliveryEngine {
    storage: Arc<Storage>,
    config: DeliveryConfig,
    client: Arc<DeliveryClient>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_pool: Option<WorkerPool>,
    clock: Arc<dyn Clock>,
}

impl DeliveryEngine {
    /// Creates a new delivery engine.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the secret is empty or the
    /// HTTP client cannot be built.
    pub fn new(storage: Arc<Storage>, config: DeliveryConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(DeliveryError::configuration("webhook secret must not be empty"));
        }

        let client = Arc::new(DeliveryClient::new(config.client_config.clone())?);

        Ok(Self {
            storage,
            config,
            client,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancellation_token: CancellationToken::new(),
            worker_pool: None,
            clock,
        })
    }

    /// Spawns the configured workers and returns immediately.
    ///
    /// Use [`shutdown`](Self::shutdown) to stop them gracefully.
    pub async fn start(&mut self) {
        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "starting delivery engine"
        );

        let mut worker_pool = WorkerPool::new(
            self.storage.clone(),
            self.config.clone(),
            self.client.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.clock.clone(),
        );

        worker_pool.spawn_workers().await;
        self.worker_pool = Some(worker_pool);
    }

    /// Gracefully shuts down the engine.
    ///
    /// Workers stop claiming new batches; in-flight attempts get until the
    /// configured shutdown timeout to complete. Attempts abandoned at the
    /// deadline roll back and their rows stay `pending`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` if workers did not finish
    /// within the grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down delivery engine");

        if let Some(worker_pool) = self.worker_pool.take() {
            worker_pool.shutdown_graceful(self.config.shutdown_timeout).await?;
        }
        Ok(())
    }

    /// Returns a snapshot of the engine counters.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Token cancelled when shutdown begins; lets the embedding binary tie
    /// other subsystems to the engine lifecycle.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

/// Individual worker processing delivery batches.
pub struct DeliveryWorker {
    id: usize,
    storage: Arc<Storage>,
    config: DeliveryConfig,
    client: Arc<DeliveryClient>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl DeliveryWorker {
    /// Creates a new delivery worker.
    pub fn new(
        id: usize,
        storage: Arc<Storage>,
        config: DeliveryConfig,
        client: Arc<DeliveryClient>,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { id, storage, config, client, stats, cancellation_token, clock }
    }

    /// Main worker loop: claims and processes batches until cancelled.
    ///
    /// Storage errors are logged and retried after a pause; they never
    /// terminate the loop.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok` on shutdown; the signature leaves room
    /// for fatal setup failures.
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = self.id, "delivery worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.process_batch().await {
                Ok(0) => {
                    tokio::select! {
                        () = self.clock.sleep(self.config.poll_interval) => {}
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
                Ok(processed) => {
                    debug!(worker_id = self.id, processed, "batch committed");
                },
                Err(error) => {
                    error!(worker_id = self.id, %error, "batch processing failed");
                    tokio::select! {
                        () = self.clock.sleep(ERROR_BACKOFF) => {}
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "delivery worker stopped");
        Ok(())
    }

    /// Claims one batch, delivers every event in it, and commits.
    ///
    /// Returns the number of events whose outcome was recorded. If a
    /// storage write fails mid-batch the claim transaction is dropped and
    /// every row in it rolls back to its pre-claim state.
    ///
    /// # Errors
    ///
    /// Returns error if claiming, outcome recording, or the commit fails.
    pub async fn process_batch(&self) -> Result<usize> {
        let Some(mut batch) = self.storage.events.claim_batch(self.config.batch_size).await?
        else {
            return Ok(0);
        };

        let events = batch.take_events();
        debug!(worker_id = self.id, claimed = events.len(), "claimed event batch");

        let mut processed = 0usize;
        for event in &events {
            // Stop claiming new work on shutdown, but finish nothing halfway:
            // rows not yet processed are simply not part of the commit.
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let result = self.deliver_event(&mut batch, event).await?;
            processed += 1;
            self.record_stats(&result).await;
        }

        batch.commit().await?;
        Ok(processed)
    }

    /// Delivers a single event and records the outcome in the batch.
    async fn deliver_event(
        &self,
        batch: &mut ClaimedBatch,
        event: &WebhookEvent,
    ) -> Result<AttemptResult> {
        let attempt_number = event.attempt_count + 1;

        let body = event
            .canonical_body()
            .map_err(|e| DeliveryError::serialization(e.to_string()))?;
        let signature = signer::signature_header(self.config.secret.as_bytes(), &body);

        debug!(
            worker_id = self.id,
            event_id = %event.id,
            attempt = attempt_number,
            target_url = %event.target_url,
            "attempting delivery"
        );

        let outcome =
            self.client.send(&event.target_url, Bytes::from(body), &signature).await;

        match &outcome {
            Outcome::Response { status_code, body } if outcome.is_success() => {
                batch
                    .record_success(event.id, attempt_number, *status_code, Some(body.as_str()))
                    .await?;

                info!(
                    worker_id = self.id,
                    event_id = %event.id,
                    status = status_code,
                    attempt = attempt_number,
                    "webhook delivered"
                );
                Ok(AttemptResult::Delivered)
            },
            _ => self.record_failed_attempt(batch, event.id, attempt_number, &outcome).await,
        }
    }

    /// Records a failed attempt: reschedule with backoff, or retire as dead
    /// once the attempt limit is reached.
    async fn record_failed_attempt(
        &self,
        batch: &mut ClaimedBatch,
        event_id: EventId,
        attempt_number: i32,
        outcome: &Outcome,
    ) -> Result<AttemptResult> {
        let (status_code, response_body, transport_error, last_error) = match outcome {
            Outcome::Response { status_code, body } => {
                let summary = if body.is_empty() {
                    format!("HTTP {status_code}: no body")
                } else {
                    format!("HTTP {status_code}: {body}")
                };
                (Some(*status_code), Some(body.as_str()), None, summary)
            },
            Outcome::TransportError { message } => {
                (None, None, Some(message.as_str()), message.clone())
            },
        };

        let max_attempts = i32::try_from(self.config.max_attempts).unwrap_or(i32::MAX);
        if attempt_number >= max_attempts {
            batch
                .record_failure(
                    event_id,
                    attempt_number,
                    status_code,
                    response_body,
                    transport_error,
                    &last_error,
                    FailureDisposition::Dead,
                )
                .await?;

            error!(
                worker_id = self.id,
                event_id = %event_id,
                attempts = attempt_number,
                last_error = %last_error,
                "retries exhausted, event dead"
            );
            return Ok(AttemptResult::Dead);
        }

        let delay = self.config.backoff.next_delay(u32::try_from(attempt_number).unwrap_or(0));
        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));

        batch
            .record_failure(
                event_id,
                attempt_number,
                status_code,
                response_body,
                transport_error,
                &last_error,
                FailureDisposition::Retry { next_retry_at },
            )
            .await?;

        warn!(
            worker_id = self.id,
            event_id = %event_id,
            attempt = attempt_number,
            next_retry_at = %next_retry_at,
            last_error = %last_error,
            "delivery failed, retry scheduled"
        );
        Ok(AttemptResult::Retried)
    }

    async fn record_stats(&self, result: &AttemptResult) {
        let mut stats = self.stats.write().await;
        stats.events_processed += 1;
        match result {
            AttemptResult::Delivered => stats.delivered += 1,
            AttemptResult::Retried => stats.retried += 1,
            AttemptResult::Dead => stats.dead += 1,
        }
    }
}
