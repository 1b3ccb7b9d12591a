use std::sync::Arc;

use docspasta_worker::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Opaque user identity the core consumes (SPEC_FULL.md §1's "auth is
/// out of scope"): lifted from a header rather than decoded from a token,
/// since deciding how `user_id` is minted belongs to the caller, not here.
pub struct UserId(pub String);

impl<S> axum::extract::FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = crate::error::ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match header {
            Some(id) => Ok(UserId(id.to_string())),
            None => Err(crate::error::ApiError::bad_request("missing X-User-Id header")),
        }
    }
}
