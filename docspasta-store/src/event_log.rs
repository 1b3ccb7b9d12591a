//! Per-job append-only event log (SPEC_FULL.md §4.7).
//!
//! Grounded directly on this codebase's Postgres-backed event store: a
//! `BIGSERIAL`-keyed append-only table with a gap-free read loop — a
//! concurrent transaction that hasn't committed yet can leave a momentary
//! hole in the sequence, so `read_from` stops at the first gap and lets the
//! next poll pick up once it closes, rather than ever handing a consumer an
//! out-of-order or skipped id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use docspasta_core::event::EventPayload;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEventRow {
    pub seq: i64,
    pub job_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredEvent {
    pub event_id: String,
    pub job_id: Uuid,
    pub user_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.seq.to_string(),
            job_id: row.job_id,
            user_id: row.user_id,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event, returning its assigned monotonic `event_id`.
    async fn append(&self, job_id: Uuid, user_id: &str, payload: &EventPayload) -> Result<String>;

    /// Gap-free read of events for `job_id` with `seq > cursor`, ascending,
    /// capped at `limit`.
    async fn read_from(&self, job_id: Uuid, cursor: i64, limit: i64) -> Result<Vec<StoredEvent>>;

    /// True if no event with `seq > cursor` exists for this job yet.
    async fn is_caught_up(&self, job_id: Uuid, cursor: i64) -> Result<bool> {
        Ok(self.read_from(job_id, cursor + 1, 1).await?.is_empty())
    }
}

pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, job_id: Uuid, user_id: &str, payload: &EventPayload) -> Result<String> {
        let type_name = payload.type_name();
        // `EventPayload`'s tagged serialization is `{"type", "payload"}`; the
        // `type` half is already the `event_type` column, so only the inner
        // fields are stored here, keeping the column flat for readers that
        // reassemble `{"type": event_type, "payload": <this column>}`.
        let full = serde_json::to_value(payload)?;
        let payload_json = full.get("payload").cloned().unwrap_or(full);

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO events (job_id, user_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING seq
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .bind(type_name)
        .bind(&payload_json)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.to_string())
    }

    async fn read_from(&self, job_id: Uuid, cursor: i64, limit: i64) -> Result<Vec<StoredEvent>> {
        let rows: Vec<StoredEventRow> = sqlx::query_as(
            r#"
            SELECT seq, job_id, user_id, event_type, payload, created_at
            FROM events
            WHERE job_id = $1 AND seq >= $2
            ORDER BY seq ASC
            LIMIT $3
            "#,
        )
        .bind(job_id)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // Gap-free guarantee: stop at the first hole. The next read will
        // see the gap close once the in-flight transaction commits.
        let mut result = Vec::with_capacity(rows.len());
        let mut expected = cursor;
        for row in rows {
            if row.seq != expected {
                break;
            }
            expected = row.seq + 1;
            result.push(row.into());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_event_carries_string_event_id() {
        let row = StoredEventRow {
            seq: 42,
            job_id: Uuid::nil(),
            user_id: "u1".into(),
            event_type: "heartbeat".into(),
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        };
        let stored: StoredEvent = row.into();
        assert_eq!(stored.event_id, "42");
    }
}
