//! SSE gateway integration tests: resume cursor, poison-pill skipping, and
//! the already-terminal shortcut. Driven through `build_router` the same
//! way as `server_test.rs`, reading the streamed body to completion with
//! `http_body_util::BodyExt::collect` — every scenario below ends the
//! stream itself (terminal job, or a job driven to terminal mid-stream),
//! so collecting never hangs.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use docspasta_core::config::CrawlConfig;
use docspasta_core::model::JobStatus;
use docspasta_server::{build_router, AppState};
use docspasta_store::job_store::{JobStore, NewJob};
use docspasta_worker::testing::{FakeEventLog, FakeFetcher, FakeJobStore};
use docspasta_worker::Orchestrator;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

const USER: &str = "user-1";

async fn seed_job(job_store: &FakeJobStore, job_id: Uuid) {
    job_store
        .create_job(NewJob {
            id: job_id,
            user_id: USER.to_string(),
            seed_url: "https://docs.example.com".to_string(),
            config: CrawlConfig::default(),
        })
        .await
        .unwrap();
}

fn body_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

#[tokio::test]
async fn already_terminal_job_emits_single_completed_event_and_closes() {
    let job_store = Arc::new(FakeJobStore::new());
    let job_id = Uuid::new_v4();
    seed_job(&job_store, job_id).await;
    job_store
        .complete_job(job_id, JobStatus::Completed, Some("# Docs\n".to_string()), None)
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        job_store,
        Arc::new(FakeEventLog::new()),
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(FakeFetcher::new()),
    );
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let req = Request::get(format!("/jobs/{job_id}/stream"))
        .header("x-user-id", USER)
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let text = body_text(&bytes);
    assert!(text.contains("event: job_completed"), "body was: {text}");
}

#[tokio::test]
async fn failed_job_emits_job_failed_event() {
    let job_store = Arc::new(FakeJobStore::new());
    let job_id = Uuid::new_v4();
    seed_job(&job_store, job_id).await;
    job_store
        .complete_job(job_id, JobStatus::Failed, None, Some("all pages errored".to_string()))
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        job_store,
        Arc::new(FakeEventLog::new()),
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(FakeFetcher::new()),
    );
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let req = Request::get(format!("/jobs/{job_id}/stream"))
        .header("x-user-id", USER)
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();

    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let text = body_text(&bytes);
    assert!(text.contains("event: job_failed"), "body was: {text}");
    assert!(text.contains("all pages errored"), "body was: {text}");
}

#[tokio::test]
async fn poison_pill_event_is_skipped_and_cursor_advances() {
    let job_store = Arc::new(FakeJobStore::new());
    let job_id = Uuid::new_v4();
    seed_job(&job_store, job_id).await;

    let event_log = Arc::new(FakeEventLog::new());
    // A row whose declared type is `url_crawled` but whose payload is
    // missing every field that variant requires - round-tripping it
    // through `EventPayload` fails, which is exactly the malformed-event
    // case the gateway must skip over rather than stall on.
    event_log.push_raw(job_id, USER, "url_crawled", serde_json::json!({}));

    // Mark the job terminal so the stream's poll loop exits after it
    // notices the queue is empty past the poison pill, instead of polling
    // forever.
    job_store
        .complete_job(job_id, JobStatus::Completed, Some("# Docs\n".to_string()), None)
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        job_store,
        event_log,
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(FakeFetcher::new()),
    );
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let req = Request::get(format!("/jobs/{job_id}/stream"))
        .header("x-user-id", USER)
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();

    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let text = body_text(&bytes);
    assert!(text.contains("event: processing_error"), "body was: {text}");
    assert!(text.contains("event: job_completed"), "body was: {text}");
}

#[tokio::test]
async fn resume_with_last_event_id_skips_already_seen_events() {
    let job_store = Arc::new(FakeJobStore::new());
    let job_id = Uuid::new_v4();
    seed_job(&job_store, job_id).await;

    let event_log = Arc::new(FakeEventLog::new());
    let first_id = event_log.push_raw(
        job_id,
        USER,
        "url_started",
        serde_json::json!({ "url": "https://docs.example.com", "depth": 0 }),
    );
    event_log.push_raw(
        job_id,
        USER,
        "url_started",
        serde_json::json!({ "url": "https://docs.example.com/guide", "depth": 1 }),
    );

    job_store
        .complete_job(job_id, JobStatus::Completed, Some("# Docs\n".to_string()), None)
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        job_store,
        event_log,
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(FakeFetcher::new()),
    );
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let req = Request::get(format!("/jobs/{job_id}/stream"))
        .header("x-user-id", USER)
        .header("last-event-id", first_id)
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();

    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let text = body_text(&bytes);
    assert!(text.contains("guide"), "body was: {text}");
    assert!(!text.contains("\"depth\":0"), "first event should have been skipped: {text}");
}

#[tokio::test]
async fn stream_rejects_other_users_job() {
    let job_store = Arc::new(FakeJobStore::new());
    let job_id = Uuid::new_v4();
    seed_job(&job_store, job_id).await;

    let orchestrator = Orchestrator::new(
        job_store,
        Arc::new(FakeEventLog::new()),
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(FakeFetcher::new()),
    );
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let req = Request::get(format!("/jobs/{job_id}/stream"))
        .header("x-user-id", "someone-else")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
