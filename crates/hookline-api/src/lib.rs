//! HTTP API for event submission and lookup.
//!
//! Provides the ingestion endpoint that enqueues events, read-only lookup
//! endpoints over the queue and the attempt audit log, and a health check.
//! Also owns the layered service configuration used by the binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use hookline_core::storage::Storage;

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Storage layer over the queue database.
    pub storage: Arc<Storage>,

    /// Target used when a submission omits `target_url`.
    pub default_target_url: String,
}

impl AppState {
    /// Creates handler state from the storage layer and configuration.
    pub fn new(storage: Arc<Storage>, default_target_url: String) -> Self {
        Self { storage, default_target_url }
    }
}
