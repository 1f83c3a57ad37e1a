//! Core domain models and storage layer for the hookline dispatcher.
//!
//! Defines the event queue row, the delivery attempt audit record, the
//! status state machine, and the PostgreSQL repository layer that owns
//! every piece of SQL in the system. All other crates depend on these
//! foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{DeliveryAttempt, EventId, EventStatus, WebhookEvent};
pub use time::{Clock, RealClock};
