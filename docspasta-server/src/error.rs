//! Error envelope (SPEC_FULL.md §6.1): every 4xx/5xx response is
//! `{success:false, error, details?}`, mirroring the teacher's
//! `(StatusCode, Json(json!({"error": ...})))` tuple idiom in
//! `rootsignal-api/src/rest/submit.rs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use docspasta_worker::WorkerError;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "job not found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::NotFound => ApiError::not_found(),
            WorkerError::Forbidden => ApiError::new(StatusCode::NOT_FOUND, "job not found"),
            WorkerError::BadRequest(msg) => ApiError::bad_request(msg),
            WorkerError::Store(e) => {
                tracing::error!(error = %e, "store error");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
            WorkerError::Other(e) => {
                tracing::error!(error = %e, "unexpected error");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}
