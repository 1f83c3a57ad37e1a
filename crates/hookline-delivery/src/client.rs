//! HTTP sender for webhook delivery.
//!
//! Issues outbound POSTs with a bounded total timeout and returns a
//! normalized [`Outcome`]. The sender never fails: DNS errors, refused
//! connections, TLS failures, timeouts, and read errors all come back as
//! `Outcome::TransportError`, leaving the retry decision entirely to the
//! worker.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{DeliveryError, Result},
    signer::SIGNATURE_HEADER,
};

/// Configuration for the delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Total timeout per outbound call.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Response bodies are truncated to this many bytes before storage.
    pub max_response_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: "Hookline/0.1".to_string(),
            max_response_bytes: 2048,
        }
    }
}

/// Normalized result of one outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The target produced an HTTP response (success or not).
    Response {
        /// HTTP status code returned by the target.
        status_code: u16,
        /// Response body, truncated to the configured cap.
        body: String,
    },

    /// The call never produced a response: DNS failure, connection refused,
    /// TLS error, timeout, or read error.
    TransportError {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl Outcome {
    /// True when the target answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Response { status_code, .. } if (200..300).contains(status_code))
    }

    /// Status code when a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Response { status_code, .. } => Some(*status_code),
            Self::TransportError { .. } => None,
        }
    }
}

/// HTTP client for webhook delivery.
///
/// Wraps a pooled `reqwest` client so repeated deliveries to the same host
/// reuse connections.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// POSTs a signed body to the target URL.
    ///
    /// Sends `Content-Type: application/json` and the signature header; the
    /// body bytes must be exactly the bytes the signature was computed
    /// over. Every failure mode is captured in the returned [`Outcome`].
    pub async fn send(&self, target_url: &str, body: Bytes, signature: &str) -> Outcome {
        let response = self
            .client
            .post(target_url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                debug!(target_url, status = status_code, "received response");

                let body = self.read_truncated_body(response).await;
                Outcome::Response { status_code, body }
            },
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("request timed out after {}s", self.config.timeout.as_secs())
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    e.to_string()
                };

                warn!(target_url, error = %message, "delivery transport error");
                Outcome::TransportError { message }
            },
        }
    }

    /// Reads the response body, truncating to the configured cap.
    async fn read_truncated_body(&self, response: reqwest::Response) -> String {
        match response.bytes().await {
            Ok(bytes) => {
                let cap = self.config.max_response_bytes.min(bytes.len());
                String::from_utf8_lossy(&bytes[..cap]).into_owned()
            },
            Err(e) => {
                warn!("failed to read response body: {e}");
                format!("[failed to read response body: {e}]")
            },
        }
    }
}
