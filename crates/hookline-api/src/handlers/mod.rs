//! Request handlers for the hookline API.

pub mod events;
pub mod health;
pub mod ingest;

pub use events::{get_event, list_attempts};
pub use health::health_check;
pub use ingest::submit_event;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error payload returned on every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error description.
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}
