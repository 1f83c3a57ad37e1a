//! Worker pool lifecycle management.
//!
//! Spawns supervised worker tasks and coordinates graceful shutdown: the
//! cancellation token stops new claims, then the pool waits for in-flight
//! batches up to a grace period. Tasks still running at the deadline are
//! abandoned; their claim transactions roll back when the tasks are dropped,
//! leaving the rows `pending`.

use std::{sync::Arc, time::Duration};

use hookline_core::{storage::Storage, Clock};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    client::DeliveryClient,
    error::{DeliveryError, Result},
    worker::{DeliveryConfig, DeliveryWorker, EngineStats},
};

/// Pool of delivery worker tasks with collective lifecycle management.
pub struct WorkerPool {
    storage: Arc<Storage>,
    config: DeliveryConfig,
    client: Arc<DeliveryClient>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
    clock: Arc<dyn Clock>,
}

impl WorkerPool {
    /// Creates a new worker pool with the given configuration.
    pub fn new(
        storage: Arc<Storage>,
        config: DeliveryConfig,
        client: Arc<DeliveryClient>,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            config,
            client,
            stats,
            cancellation_token,
            worker_handles: Vec::new(),
            clock,
        }
    }

    /// Spawns all configured workers and begins processing.
    ///
    /// Workers run until the cancellation token fires.
    pub async fn spawn_workers(&mut self) {
        info!(worker_count = self.config.worker_count, "spawning delivery workers");

        {
            let mut stats = self.stats.write().await;
            stats.active_workers = self.config.worker_count;
        }

        for worker_id in 0..self.config.worker_count {
            let worker = DeliveryWorker::new(
                worker_id,
                self.storage.clone(),
                self.config.clone(),
                self.client.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
                self.clock.clone(),
            );

            let handle = tokio::spawn(async move { worker.run().await });
            self.worker_handles.push(handle);
        }
    }

    /// Signals shutdown and waits for workers under the grace period.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` when workers are still
    /// running at the deadline; abandoned claim transactions roll back.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!("signalling delivery workers to stop");
        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let join_all = async {
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => warn!(%error, "worker exited with error"),
                    Err(join_error) => warn!(%join_error, "worker task panicked"),
                }
            }
        };

        if tokio::time::timeout(timeout, join_all).await.is_err() {
            warn!(
                timeout_seconds = timeout.as_secs(),
                "shutdown grace period expired, abandoning in-flight attempts"
            );
            return Err(DeliveryError::ShutdownTimeout { timeout_seconds: timeout.as_secs() });
        }

        info!("all delivery workers stopped");
        Ok(())
    }
}
