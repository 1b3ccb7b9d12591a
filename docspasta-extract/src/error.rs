use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("non-2xx status: {0}")]
    HttpStatus(u16),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
