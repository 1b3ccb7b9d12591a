//! SSE Gateway (SPEC_FULL.md §4.11, §6.3): one cooperative task per
//! connection with explicit suspension points — a bounded block-read off
//! the event log, a heartbeat on silence, and a wall-clock-driven
//! `reconnect` signal instead of letting the connection run forever.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use docspasta_core::event::EventPayload;
use docspasta_core::model::JobStatus;

use crate::error::ApiError;
use crate::state::{AppState, UserId};

/// How long a single connection is allowed to run before the gateway forces
/// a `reconnect` and closes, inside the 60s wall-clock budget from §5.
const CONNECTION_BUDGET: Duration = Duration::from_secs(50);
/// Block-read window per poll of the event log, before the read is retried.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Silence after which a heartbeat comment is sent to keep the connection alive.
const HEARTBEAT_AFTER: Duration = Duration::from_secs(10);
const READ_BATCH: i64 = 256;

#[derive(Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "resumeAt")]
    resume_at: Option<i64>,
}

pub async fn stream_job(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let job = state
        .orchestrator
        .get_job(&user_id, job_id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    let cursor = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .or(query.resume_at)
        .unwrap_or(0);

    let ctx = state.orchestrator.context();

    let stream = async_stream::stream! {
        if job.status.is_terminal() {
            yield ok(terminal_event(&job));
            return;
        }

        let started = Instant::now();
        let mut cursor = cursor;
        let mut last_activity = Instant::now();

        loop {
            if started.elapsed() >= CONNECTION_BUDGET {
                yield ok(payload_event(
                    "reconnect".to_string(),
                    &EventPayload::Reconnect { reason: "function_timeout".to_string() },
                    None,
                ));
                return;
            }

            let events = match ctx.event_log.read_from(job_id, cursor + 1, READ_BATCH).await {
                Ok(events) => events,
                Err(e) => {
                    yield ok(payload_event(
                        "processing_error".to_string(),
                        &EventPayload::ProcessingError {
                            offending_event_id: cursor.to_string(),
                            error: e.to_string(),
                        },
                        None,
                    ));
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            if events.is_empty() {
                if last_activity.elapsed() >= HEARTBEAT_AFTER {
                    yield ok(Event::default().comment("heartbeat"));
                    last_activity = Instant::now();
                }
                tokio::time::sleep(POLL_INTERVAL).await;

                // A terminal job with an empty queue past this cursor will
                // never produce another event; stop polling once we observe it.
                if let Ok(Some(latest)) = ctx.job_store.get_job(&user_id, job_id).await {
                    if latest.status.is_terminal() {
                        yield ok(terminal_event(&latest));
                        return;
                    }
                }
                continue;
            }

            for stored in events {
                let seq: i64 = stored.event_id.parse().unwrap_or(cursor);
                let reconstructed = serde_json::from_value::<EventPayload>(serde_json::json!({
                    "type": stored.event_type,
                    "payload": stored.payload,
                }));
                match reconstructed {
                    Ok(payload) => {
                        yield ok(payload_event(stored.event_type.clone(), &payload, Some(stored.event_id.clone())));
                    }
                    Err(_) => {
                        yield ok(payload_event(
                            "processing_error".to_string(),
                            &EventPayload::ProcessingError {
                                offending_event_id: stored.event_id.clone(),
                                error: "malformed event payload".to_string(),
                            },
                            Some(stored.event_id.clone()),
                        ));
                    }
                }
                cursor = seq;
                last_activity = Instant::now();
            }
        }
    };

    Ok((
        StatusCode::OK,
        [
            ("cache-control", "no-cache"),
            ("connection", "keep-alive"),
            ("x-accel-buffering", "no"),
        ],
        Sse::new(stream),
    )
        .into_response())
}

fn ok(event: Event) -> Result<Event, Infallible> {
    Ok(event)
}

fn payload_event(event_type: String, payload: &EventPayload, event_id: Option<String>) -> Event {
    let data = serde_json::to_value(payload)
        .ok()
        .and_then(|v| v.get("payload").cloned())
        .unwrap_or(serde_json::Value::Null);
    let mut event = Event::default().event(event_type).json_data(data).unwrap_or_default();
    if let Some(id) = event_id {
        event = event.id(id);
    }
    event
}

fn terminal_event(job: &docspasta_core::model::Job) -> Event {
    match job.status {
        JobStatus::Completed | JobStatus::Partial => payload_event(
            "job_completed".to_string(),
            &EventPayload::JobCompleted {
                job_id: job.id,
                total_processed: job.progress_summary.processed,
                total_discovered: job.progress_summary.discovered,
            },
            None,
        ),
        _ => payload_event(
            "job_failed".to_string(),
            &EventPayload::JobFailed {
                job_id: job.id,
                error: job.status_message.clone().unwrap_or_else(|| "job failed".to_string()),
                total_processed: Some(job.progress_summary.processed),
                total_discovered: Some(job.progress_summary.discovered),
            },
            None,
        ),
    }
}
