//! Event submission handler.
//!
//! Accepts a JSON document plus an optional per-event target URL, inserts a
//! `pending` row, and returns the event ID with 202. Malformed input is
//! rejected with 400 and never reaches the queue.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{handlers::error_response, AppState};

/// Request body for event submission.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    /// Arbitrary JSON payload to deliver.
    pub payload: serde_json::Value,

    /// Destination URL; falls back to the configured default when absent.
    #[serde(default)]
    pub target_url: Option<String>,
}

/// Response from a successful submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Identifier of the queued event.
    pub id: String,
    /// Always `"accepted"`; delivery happens asynchronously.
    pub status: String,
}

/// Handles `POST /events`.
///
/// Returns 202 with the new event ID, or 400 for malformed JSON, a missing
/// payload, or a target that is not an absolute http(s) URL.
#[instrument(name = "submit_event", skip(state, request))]
pub async fn submit_event(
    State(state): State<AppState>,
    request: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            warn!(error = %rejection, "rejected malformed submission");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        },
    };

    let target_url =
        request.target_url.unwrap_or_else(|| state.default_target_url.clone());

    if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
        warn!(target_url, "rejected submission with non-http target");
        return error_response(
            StatusCode::BAD_REQUEST,
            "target_url must be an absolute http(s) URL",
        );
    }

    match state.storage.events.insert(&request.payload, &target_url).await {
        Ok(id) => {
            info!(event_id = %id, target_url, "event accepted");
            (
                StatusCode::ACCEPTED,
                Json(SubmitResponse { id: id.to_string(), status: "accepted".to_string() }),
            )
                .into_response()
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to enqueue event");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to enqueue event")
        },
    }
}
