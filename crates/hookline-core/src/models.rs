//! Domain models and strongly-typed identifiers.
//!
//! Defines the queued webhook event, its status state machine, the delivery
//! attempt audit record, and newtype ID wrappers. Status strings and IDs
//! convert at the SQL boundary via `sqlx` trait implementations so the rest
//! of the system only ever sees typed values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed event identifier.
///
/// Wraps a UUID so event IDs cannot be confused with attempt IDs. The ID is
/// generated on insert and stable for the event's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Event lifecycle status.
///
/// Every event starts `pending` and leaves that state exactly once:
///
/// ```text
/// pending ── delivery succeeded ──> delivered (terminal)
///    │
///    └── attempts exhausted ──────> dead      (terminal)
/// ```
///
/// A failed attempt below the retry limit keeps the event `pending` with a
/// later `next_retry_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Awaiting (or between) delivery attempts.
    Pending,

    /// A 2xx response was recorded. Terminal.
    Delivered,

    /// Retries exhausted. Terminal; the row is retained for inspection.
    Dead,
}

impl EventStatus {
    /// Returns true for states the event can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Dead)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Delivered => write!(f, "delivered"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

impl sqlx::Type<PgDb> for EventStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "dead" => Ok(Self::Dead),
            _ => Err(format!("invalid event status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for EventStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A queued webhook event.
///
/// The row is the single source of truth for delivery state. It is created
/// by ingestion, mutated only by workers through the storage layer, and
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookEvent {
    /// Unique identifier for this event.
    pub id: EventId,

    /// Client-supplied JSON payload, opaque to the dispatcher.
    pub payload: sqlx::types::Json<serde_json::Value>,

    /// Absolute HTTP(S) URL the payload is POSTed to.
    pub target_url: String,

    /// Current lifecycle status.
    pub status: EventStatus,

    /// Number of completed delivery attempts. Monotonically non-decreasing.
    pub attempt_count: i32,

    /// Summary of the most recent failure, or None on success / before the
    /// first attempt.
    pub last_error: Option<String>,

    /// Earliest wall-clock time the row is eligible for an attempt.
    ///
    /// Set to the insertion time on insert. NULL is tolerated by the claim
    /// query and treated as immediately due.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Insertion timestamp. Immutable.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last state transition.
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Serializes the payload to its canonical wire form.
    ///
    /// These bytes are both the HMAC input and the request body; the payload
    /// must be serialized exactly once so signature and wire bytes can never
    /// diverge.
    pub fn canonical_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.payload.0)
    }
}

/// Immutable audit record of one delivery attempt.
///
/// Exactly one row exists per `(event_id, attempt_number)`; the schema
/// enforces this with a unique index. Attempts are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryAttempt {
    /// Unique identifier for this attempt.
    pub id: Uuid,

    /// Event this attempt belongs to. Cascade-deletes with the event.
    pub event_id: EventId,

    /// Sequential attempt number, starting at 1.
    pub attempt_number: i32,

    /// HTTP status returned, or None on transport error.
    pub status_code: Option<i32>,

    /// Response body, truncated before storage.
    pub response_body: Option<String>,

    /// Transport or timeout error description, or None when an HTTP
    /// response was received.
    pub error: Option<String>,

    /// When the attempt completed.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_status_display_matches_database_strings() {
        assert_eq!(EventStatus::Pending.to_string(), "pending");
        assert_eq!(EventStatus::Delivered.to_string(), "delivered");
        assert_eq!(EventStatus::Dead.to_string(), "dead");
    }

    #[test]
    fn terminal_states_identified() {
        assert!(!EventStatus::Pending.is_terminal());
        assert!(EventStatus::Delivered.is_terminal());
        assert!(EventStatus::Dead.is_terminal());
    }

    #[test]
    fn canonical_body_is_stable_across_calls() {
        let event = WebhookEvent {
            id: EventId::new(),
            payload: sqlx::types::Json(serde_json::json!({"hello": "world", "n": 42})),
            target_url: "http://localhost:8080/webhook".to_string(),
            status: EventStatus::Pending,
            attempt_count: 0,
            last_error: None,
            next_retry_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let first = event.canonical_body().unwrap();
        let second = event.canonical_body().unwrap();
        assert_eq!(first, second, "serialization must be byte-stable for signing");
    }

    #[test]
    fn event_id_display_round_trips() {
        let id = EventId::new();
        let parsed: Uuid = id.to_string().parse().unwrap();
        assert_eq!(EventId::from(parsed), id);
    }
}
