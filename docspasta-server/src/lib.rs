//! HTTP surface (SPEC_FULL.md §6.1): REST handlers plus the SSE gateway,
//! wired over an `Orchestrator` the same way `rootsignal-server` wires a
//! `ServerDeps` into its router.

pub mod error;
pub mod routes;
pub mod sse;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/crawl", post(routes::create_crawl))
        .route("/jobs/{id}/status", get(routes::job_status))
        .route("/jobs/{id}", get(routes::job_detail).delete(routes::cancel_job))
        .route("/jobs/{id}/stream", get(sse::stream_job))
        .route("/jobs/{id}/download", get(routes::download))
        .route("/jobs/batch-state", post(routes::batch_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
