pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod normalize;
pub mod quality;

pub use config::CrawlConfig;
pub use error::CoreError;
pub use event::{Event, EventPayload};
pub use model::{ContentChunk, ContentType, Job, JobStatus, Page, PageStatus, ProgressSummary, Task};
pub use normalize::{fingerprint, is_admissible, normalize, NormalizeError};
pub use quality::{score, QualityBand, QualityReport};
