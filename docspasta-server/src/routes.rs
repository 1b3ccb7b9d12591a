//! REST handlers (SPEC_FULL.md §6.1). Every handler is user-scoped through
//! the `UserId` extractor; every response body is either the success
//! envelope `{success:true, ...}` or, via `ApiError`, the error envelope
//! `{success:false, error}`.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docspasta_core::config::CrawlConfig;
use docspasta_core::model::Job;

use crate::error::ApiError;
use crate::state::{AppState, UserId};

const MAX_BATCH_STATE_IDS: usize = 20;

#[derive(Deserialize)]
pub struct CrawlRequest {
    url: String,
    config: Option<CrawlConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlAccepted {
    job_id: Uuid,
    status: &'static str,
    status_url: String,
    details_url: String,
}

pub async fn create_crawl(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<CrawlRequest>,
) -> Result<Response, ApiError> {
    let url = body.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::bad_request("url must not be empty"));
    }

    let job = state
        .orchestrator
        .create_job(&user_id, &url, body.config)
        .await?;

    let accepted = CrawlAccepted {
        job_id: job.id,
        status: "pending",
        status_url: format!("/jobs/{}/status", job.id),
        details_url: format!("/jobs/{}", job.id),
    };
    Ok((StatusCode::ACCEPTED, Json(success(accepted))).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusBody {
    status: docspasta_core::model::JobStatus,
    total_processed: u64,
    total_discovered: u64,
    total_words: i64,
    state_version: i64,
    progress_summary: docspasta_core::model::ProgressSummary,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    completed_at: Option<chrono::DateTime<Utc>>,
    error: Option<String>,
}

pub async fn job_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .orchestrator
        .get_job(&user_id, job_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let total_words = state
        .orchestrator
        .context()
        .job_store
        .total_word_count(job_id)
        .await
        .map_err(docspasta_worker::WorkerError::from)?;

    let body = JobStatusBody {
        status: job.status,
        total_processed: job.progress_summary.processed,
        total_discovered: job.progress_summary.discovered,
        total_words,
        state_version: job.state_version,
        progress_summary: job.progress_summary,
        created_at: job.created_at,
        updated_at: job.updated_at,
        completed_at: job.completed_at,
        error: job.status_message,
    };
    Ok(Json(success(body)))
}

#[derive(Serialize)]
struct JobDetailBody {
    #[serde(flatten)]
    job: Job,
    page_counts: docspasta_store::job_store::PageCounts,
}

pub async fn job_detail(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .orchestrator
        .get_job(&user_id, job_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let counts = state
        .orchestrator
        .context()
        .job_store
        .page_counts(job_id)
        .await
        .map_err(docspasta_worker::WorkerError::from)?;

    Ok(Json(success(JobDetailBody {
        job,
        page_counts: counts,
    })))
}

pub async fn download(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = state
        .orchestrator
        .get_job(&user_id, job_id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    if job.status != docspasta_core::model::JobStatus::Completed
        && job.status != docspasta_core::model::JobStatus::Partial
    {
        return Err(ApiError::bad_request("job has not completed yet"));
    }
    let Some(markdown) = job.final_markdown else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "no artifact for this job"));
    };

    let filename = format!("crawl-{job_id}.md");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        markdown,
    )
        .into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStateRequest {
    job_ids: Vec<Uuid>,
}

pub async fn batch_state(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<BatchStateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.job_ids.len() > MAX_BATCH_STATE_IDS {
        return Err(ApiError::bad_request(format!(
            "at most {MAX_BATCH_STATE_IDS} job ids allowed, got {}",
            body.job_ids.len()
        )));
    }

    let result = state
        .orchestrator
        .batch_job_states(&user_id, body.job_ids)
        .await?;

    let states: serde_json::Map<String, serde_json::Value> = result
        .states
        .into_iter()
        .map(|(id, s)| {
            (
                id.to_string(),
                serde_json::json!({
                    "status": s.status,
                    "totalProcessed": s.total_processed,
                    "totalDiscovered": s.total_discovered,
                    "recentActivity": s.recent_activity,
                    "lastEventId": s.last_event_id,
                    "error": s.error,
                }),
            )
        })
        .collect();

    Ok(Json(success(serde_json::json!({
        "states": states,
        "notFound": result.not_found,
    }))))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orchestrator.cancel_job(&user_id, job_id).await?;
    Ok(Json(success(serde_json::json!({ "cancelled": true }))))
}

fn success(data: impl Serialize) -> serde_json::Value {
    let mut value = serde_json::to_value(data).unwrap_or(serde_json::Value::Null);
    if let serde_json::Value::Object(ref mut map) = value {
        map.insert("success".to_string(), serde_json::Value::Bool(true));
    }
    value
}
