//! Integration tests for the storage layer and claim protocol.
//!
//! These exercise real PostgreSQL behavior (`FOR UPDATE SKIP LOCKED`,
//! transactional rollback) and are ignored unless a server is reachable
//! via `TEST_DATABASE_URL` or `DATABASE_URL`.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use hookline_core::{
    storage::FailureDisposition,
    EventId, EventStatus,
};
use hookline_testing::TestEnv;
use serde_json::json;

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn insert_creates_immediately_due_pending_row() -> Result<()> {
    let env = TestEnv::new().await?;

    let id = env.insert_event(json!({"hello": "world"}), "http://localhost:9999/hook").await?;
    let event = env.event(id).await?;

    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(event.attempt_count, 0);
    assert!(event.last_error.is_none());
    assert!(event.next_retry_at.is_some(), "insert must set next_retry_at");
    assert!(event.next_retry_at.unwrap() <= Utc::now());
    assert_eq!(event.payload.0, json!({"hello": "world"}));

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn find_unknown_event_returns_none() -> Result<()> {
    let env = TestEnv::new().await?;

    let missing = env.storage().events.find(EventId::new()).await?;
    assert!(missing.is_none());

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn claim_returns_only_due_events() -> Result<()> {
    let env = TestEnv::new().await?;

    let due = env.insert_event(json!({"n": 1}), "http://localhost:9999/hook").await?;
    let scheduled = env.insert_event(json!({"n": 2}), "http://localhost:9999/hook").await?;

    sqlx::query("UPDATE webhook_events SET next_retry_at = NOW() + INTERVAL '1 hour' WHERE id = $1")
        .bind(scheduled)
        .execute(env.pool())
        .await?;

    let mut batch = env
        .storage()
        .events
        .claim_batch(10)
        .await?
        .expect("one event should be claimable");
    let events = batch.take_events();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, due);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn claimed_rows_are_invisible_to_concurrent_claims() -> Result<()> {
    let env = TestEnv::new().await?;

    env.insert_event(json!({"n": 1}), "http://localhost:9999/hook").await?;

    let first = env.storage().events.claim_batch(10).await?;
    assert!(first.is_some(), "first claim should win the row");

    // SKIP LOCKED: the second claimer sees nothing rather than blocking.
    let second = env.storage().events.claim_batch(10).await?;
    assert!(second.is_none(), "locked row must not be claimable twice");

    // Releasing the first claim without recording anything returns the row.
    drop(first);
    let third = env.storage().events.claim_batch(10).await?;
    assert!(third.is_some(), "row should be claimable again after rollback");

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn record_success_transitions_to_delivered() -> Result<()> {
    let env = TestEnv::new().await?;

    let id = env.insert_event(json!({"k": "v"}), "http://localhost:9999/hook").await?;

    let mut batch = env.storage().events.claim_batch(10).await?.expect("claimable");
    let events = batch.take_events();
    assert_eq!(events[0].id, id);

    batch.record_success(id, 1, 200, Some("OK")).await?;
    batch.commit().await?;

    let event = env.event(id).await?;
    assert_eq!(event.status, EventStatus::Delivered);
    assert_eq!(event.attempt_count, 1);
    assert!(event.last_error.is_none());

    let attempts = env.attempts(id).await?;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt_number, 1);
    assert_eq!(attempts[0].status_code, Some(200));
    assert_eq!(attempts[0].response_body.as_deref(), Some("OK"));
    assert!(attempts[0].error.is_none());

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn record_failure_with_retry_keeps_event_pending() -> Result<()> {
    let env = TestEnv::new().await?;

    let id = env.insert_event(json!({"k": "v"}), "http://localhost:9999/hook").await?;
    let next_retry_at = Utc::now() + ChronoDuration::minutes(5);

    let mut batch = env.storage().events.claim_batch(10).await?.expect("claimable");
    batch.take_events();
    batch
        .record_failure(
            id,
            1,
            Some(500),
            Some("Internal Server Error"),
            None,
            "HTTP 500: Internal Server Error",
            FailureDisposition::Retry { next_retry_at },
        )
        .await?;
    batch.commit().await?;

    let event = env.event(id).await?;
    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(event.attempt_count, 1);
    assert_eq!(event.last_error.as_deref(), Some("HTTP 500: Internal Server Error"));
    assert!(event.next_retry_at.unwrap() > Utc::now());

    // Not yet due, so not claimable.
    assert!(env.storage().events.claim_batch(10).await?.is_none());

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn record_failure_dead_is_terminal() -> Result<()> {
    let env = TestEnv::new().await?;

    let id = env.insert_event(json!({"k": "v"}), "http://localhost:9999/hook").await?;

    let mut batch = env.storage().events.claim_batch(10).await?.expect("claimable");
    batch.take_events();
    batch
        .record_failure(
            id,
            1,
            None,
            None,
            Some("connection refused"),
            "connection refused",
            FailureDisposition::Dead,
        )
        .await?;
    batch.commit().await?;

    let event = env.event(id).await?;
    assert_eq!(event.status, EventStatus::Dead);
    assert_eq!(event.attempt_count, 1);
    assert!(event.next_retry_at.is_none());
    assert_eq!(event.last_error.as_deref(), Some("connection refused"));

    // Terminal rows are never claimed again.
    assert!(env.storage().events.claim_batch(10).await?.is_none());

    let attempts = env.attempts(id).await?;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status_code, None);
    assert_eq!(attempts[0].error.as_deref(), Some("connection refused"));

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn dropping_batch_rolls_back_recorded_outcomes() -> Result<()> {
    let env = TestEnv::new().await?;

    let id = env.insert_event(json!({"k": "v"}), "http://localhost:9999/hook").await?;

    {
        let mut batch = env.storage().events.claim_batch(10).await?.expect("claimable");
        batch.take_events();
        batch.record_success(id, 1, 200, Some("OK")).await?;
        // Dropped without commit: simulates a worker crash after the HTTP
        // call but before the outcome became durable.
    }

    let event = env.event(id).await?;
    assert_eq!(event.status, EventStatus::Pending, "crash must leave the row pending");
    assert_eq!(event.attempt_count, 0);
    assert_eq!(env.attempts(id).await?.len(), 0, "no attempt row survives a rollback");

    // Immediately claimable again.
    assert!(env.storage().events.claim_batch(10).await?.is_some());

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn claim_orders_most_overdue_first() -> Result<()> {
    let env = TestEnv::new().await?;

    let newer = env.insert_event(json!({"n": 1}), "http://localhost:9999/hook").await?;
    let older = env.insert_event(json!({"n": 2}), "http://localhost:9999/hook").await?;

    sqlx::query("UPDATE webhook_events SET next_retry_at = NOW() - INTERVAL '10 minutes' WHERE id = $1")
        .bind(older)
        .execute(env.pool())
        .await?;

    let mut batch = env.storage().events.claim_batch(10).await?.expect("claimable");
    let events = batch.take_events();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, older);
    assert_eq!(events[1].id, newer);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set TEST_DATABASE_URL)"]
async fn duplicate_attempt_numbers_rejected_by_schema() -> Result<()> {
    let env = TestEnv::new().await?;

    let id = env.insert_event(json!({"k": "v"}), "http://localhost:9999/hook").await?;

    let mut batch = env.storage().events.claim_batch(10).await?.expect("claimable");
    batch.take_events();
    batch
        .record_failure(
            id,
            1,
            Some(500),
            None,
            None,
            "HTTP 500: no body",
            FailureDisposition::Retry { next_retry_at: Utc::now() },
        )
        .await?;

    let duplicate = batch
        .record_failure(
            id,
            1,
            Some(500),
            None,
            None,
            "HTTP 500: no body",
            FailureDisposition::Retry { next_retry_at: Utc::now() },
        )
        .await;

    assert!(duplicate.is_err(), "unique (event_id, attempt_number) must hold");

    Ok(())
}
