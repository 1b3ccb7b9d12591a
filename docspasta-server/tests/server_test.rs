//! REST surface integration tests driven straight through `build_router`,
//! against the in-memory test doubles — no TCP listener, no Postgres.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use docspasta_extract::ExtractedPage;
use docspasta_server::{build_router, AppState};
use docspasta_store::job_store::{JobStore, NewJob};
use docspasta_worker::testing::{FakeEventLog, FakeFetcher, FakeJobStore};
use docspasta_worker::Orchestrator;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(fetcher: FakeFetcher) -> axum::Router {
    let orchestrator = Orchestrator::new(
        Arc::new(FakeJobStore::new()),
        Arc::new(FakeEventLog::new()),
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(fetcher),
    );
    build_router(AppState::new(Arc::new(orchestrator)))
}

fn seed_page() -> ExtractedPage {
    ExtractedPage {
        http_status: 200,
        title: Some("Intro".to_string()),
        markdown: Some(
            concat!(
                "# Full Reference\n\n## API Usage\n\n",
                "This reference page documents the api, including configuration ",
                "parameter details and example usage guidance for the tutorial, with ",
                "sufficient length content exceeding two hundred characters comfortably.\n"
            )
            .to_string(),
        ),
        raw_body_len: 400,
        extracted_links: Vec::new(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_crawl_requires_user_header() {
    let app = app(FakeFetcher::new().with_page("https://docs.example.com", seed_page()));

    let req = Request::post("/crawl")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "url": "https://docs.example.com" }).to_string()))
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_crawl_then_status_round_trip() {
    let app = app(FakeFetcher::new().with_page("https://docs.example.com", seed_page()));

    let req = Request::post("/crawl")
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(json!({ "url": "https://docs.example.com" }).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let req = Request::get(format!("/jobs/{job_id}/status"))
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["status"].is_string());
}

#[tokio::test]
async fn jobs_are_isolated_per_user_over_http() {
    let app = app(FakeFetcher::new().with_page("https://docs.example.com", seed_page()));

    let req = Request::post("/crawl")
        .header("content-type", "application/json")
        .header("x-user-id", "owner")
        .body(Body::from(json!({ "url": "https://docs.example.com" }).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let body = body_json(res).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let req = Request::get(format!("/jobs/{job_id}/status"))
        .header("x-user-id", "someone-else")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_before_completion_is_rejected() {
    // Insert the job straight into the store, bypassing `create_job`, so no
    // background worker races this request to a terminal status first.
    let job_store = FakeJobStore::new();
    let job_id = uuid::Uuid::new_v4();
    job_store
        .create_job(NewJob {
            id: job_id,
            user_id: "user-1".to_string(),
            seed_url: "https://docs.example.com".to_string(),
            config: docspasta_core::config::CrawlConfig::default(),
        })
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        Arc::new(job_store),
        Arc::new(FakeEventLog::new()),
        Arc::new(docspasta_store::InMemorySharedState::new()),
        Arc::new(FakeFetcher::new()),
    );
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let req = Request::get(format!("/jobs/{job_id}/download"))
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_state_rejects_more_than_twenty_ids() {
    let app = app(FakeFetcher::new());
    let ids: Vec<String> = (0..21).map(|_| uuid::Uuid::new_v4().to_string()).collect();

    let req = Request::post("/jobs/batch-state")
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(json!({ "jobIds": ids }).to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_state_empty_list_returns_empty_maps() {
    let app = app(FakeFetcher::new());

    let req = Request::post("/jobs/batch-state")
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(json!({ "jobIds": [] }).to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["states"], json!({}));
    assert_eq!(body["notFound"], json!([]));
}

#[tokio::test]
async fn invalid_seed_url_is_rejected_before_job_creation() {
    let app = app(FakeFetcher::new());

    let req = Request::post("/crawl")
        .header("content-type", "application/json")
        .header("x-user-id", "user-1")
        .body(Body::from(json!({ "url": "http://localhost/internal" }).to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
