//! Webhook delivery engine with at-least-once guarantees.
//!
//! Implements async workers that claim queued events from PostgreSQL using
//! `FOR UPDATE SKIP LOCKED`, deliver them over HTTP with HMAC-signed
//! bodies, and reschedule failures with exponential backoff. The database
//! row is the only shared state: workers hold the claim transaction for the
//! whole dispatch so a crash at any point rolls the rows back untouched.
//!
//! ```text
//!             ┌──────────────────────────────────┐
//!             │            PostgreSQL            │
//!             │   webhook_events (pending, due)  │
//!             │     FOR UPDATE SKIP LOCKED       │
//!             └────────────────┬─────────────────┘
//!                              │ disjoint claims
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!          Worker 1        Worker 2        Worker N
//!              │               │               │
//!              ▼               ▼               ▼
//!        signed POST to each event's target URL
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod retry;
pub mod signer;
pub mod worker;
pub mod worker_pool;

pub use client::{ClientConfig, DeliveryClient, Outcome};
pub use error::{DeliveryError, Result};
pub use retry::BackoffPolicy;
pub use signer::{sign, signature_header, verify, SIGNATURE_HEADER};
pub use worker::{DeliveryConfig, DeliveryEngine, DeliveryWorker, EngineStats};
pub use worker_pool::WorkerPool;

/// Default number of concurrent delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// Default batch size for claiming events from the database.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default total timeout for one outbound HTTP call, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

/// Default number of attempts before an event is retired as dead.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
