pub mod error;
pub mod event_log;
pub mod job_store;
pub mod shared_state;

pub use error::StoreError;
pub use event_log::{EventLog, PgEventLog, StoredEvent};
pub use job_store::{JobStore, NewChunk, NewJob, NewPage, PageCounts, PgJobStore};
pub use shared_state::{InMemorySharedState, ProgressField, SharedState};
