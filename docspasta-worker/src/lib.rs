pub mod crawler;
pub mod error;
pub mod finalizer;
pub mod orchestrator;
pub mod testing;

pub use crawler::{run_worker, WorkerContext, WorkerOutcome};
pub use error::WorkerError;
pub use finalizer::finalize_job;
pub use orchestrator::Orchestrator;
