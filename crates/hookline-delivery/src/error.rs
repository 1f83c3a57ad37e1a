//! Error types for delivery engine operations.
//!
//! Delivery failures against the target (non-2xx, timeouts, connection
//! errors) are not errors here: the client captures those as
//! [`Outcome`](crate::client::Outcome) values and the worker turns them
//! into retries. `DeliveryError` covers the engine's own failure modes:
//! storage, configuration, and serialization.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions inside the delivery engine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Database operation failed during claim or outcome recording.
    #[error("database error: {message}")]
    Database {
        /// Database error message.
        message: String,
    },

    /// Invalid engine or client configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },

    /// Payload could not be serialized to its canonical wire form.
    #[error("payload serialization failed: {message}")]
    Serialization {
        /// Serialization error message.
        message: String,
    },

    /// Graceful shutdown did not complete within the grace period.
    #[error("shutdown timed out after {timeout_seconds}s")]
    ShutdownTimeout {
        /// Grace period that was exceeded, in seconds.
        timeout_seconds: u64,
    },
}

impl DeliveryError {
    /// Creates a database error from a message.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a serialization error from a message.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }
}

impl From<hookline_core::CoreError> for DeliveryError {
    fn from(err: hookline_core::CoreError) -> Self {
        Self::Database { message: err.to_string() }
    }
}
