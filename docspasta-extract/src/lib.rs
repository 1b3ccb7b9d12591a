pub mod error;
pub mod fetcher;
pub mod links;
pub mod markdown;

pub use error::ExtractError;
pub use fetcher::{ExtractedPage, Extractor, PageFetcher};
