use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("store error: {0}")]
    Store(#[from] docspasta_store::StoreError),

    #[error("job not found")]
    NotFound,

    #[error("job belongs to another user")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

impl From<WorkerError> for docspasta_core::CoreError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::NotFound => docspasta_core::CoreError::NotFound,
            WorkerError::Forbidden => docspasta_core::CoreError::Forbidden,
            WorkerError::BadRequest(m) => docspasta_core::CoreError::BadRequest(m),
            WorkerError::Store(s) => s.into(),
            WorkerError::Other(e) => docspasta_core::CoreError::Other(e),
        }
    }
}
