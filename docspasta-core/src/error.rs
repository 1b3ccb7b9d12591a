use thiserror::Error;

/// Crate-wide error kind, shared by the extractor, store, worker, and server
/// crates. Maps 1:1 onto the error kinds enumerated in the crawl core design
/// (fetch/storage/invariant/input failures); HTTP handlers translate this
/// into the `{success:false, error, details?}` envelope.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("job not found")]
    NotFound,

    #[error("job belongs to another user")]
    Forbidden,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
