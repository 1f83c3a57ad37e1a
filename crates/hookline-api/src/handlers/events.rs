//! Event and attempt lookup handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hookline_core::EventId;
use tracing::instrument;
use uuid::Uuid;

use crate::{handlers::error_response, AppState};

/// Handles `GET /events/{id}`.
///
/// Returns the full event row, including status, attempt count, last error
/// and timestamps, or 404 when the ID is unknown.
#[instrument(name = "get_event", skip(state))]
pub async fn get_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.storage.events.find(EventId::from(id)).await {
        Ok(Some(event)) => Json(event).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("event {id} not found")),
        Err(e) => {
            tracing::error!(error = %e, "event lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "event lookup failed")
        },
    }
}

/// Handles `GET /events/{id}/attempts`.
///
/// Returns the delivery attempt audit log for an event, oldest first. An
/// unknown event ID returns 404 rather than an empty list.
#[instrument(name = "list_attempts", skip(state))]
pub async fn list_attempts(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let event_id = EventId::from(id);

    match state.storage.events.find(event_id).await {
        Ok(Some(_)) => {},
        Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("event {id} not found")),
        Err(e) => {
            tracing::error!(error = %e, "event lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "event lookup failed");
        },
    }

    match state.storage.attempts.find_by_event(event_id).await {
        Ok(attempts) => Json(attempts).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "attempt lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "attempt lookup failed")
        },
    }
}
