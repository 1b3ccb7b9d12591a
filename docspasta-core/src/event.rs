//! Event catalogue for the per-job append-only event log (SPEC_FULL.md §4.7).
//!
//! `EventPayload` is the typed view clients are told to validate strictly
//! against, skipping unknown/unparseable entries rather than stalling.
//! The store itself deals in `(event_type: &str, payload: serde_json::Value)`
//! pairs — see `docspasta-store::EventLog` — so this enum is a client/worker
//! convenience, not the wire representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub job_id: Uuid,
    pub user_id: String,
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    StreamConnected {
        #[serde(rename = "jobId")]
        job_id: Uuid,
        url: String,
    },
    UrlStarted {
        url: String,
        depth: i32,
    },
    UrlCrawled {
        url: String,
        success: bool,
        content_length: usize,
        title: Option<String>,
        quality: QualitySummary,
    },
    UrlsDiscovered {
        source_url: String,
        discovered_urls: Vec<String>,
        count: usize,
        total_discovered: u64,
    },
    BatchStarted {
        count: usize,
        urls: Vec<String>,
    },
    BatchCompleted {
        completed: usize,
        failed: usize,
        discovered: usize,
        #[serde(rename = "fromCache")]
        from_cache: usize,
    },
    BatchError {
        error: String,
        urls: Vec<String>,
    },
    SentToProcessing {
        url: String,
        word_count: usize,
    },
    ContentProcessed {
        pages: usize,
        #[serde(rename = "totalWords")]
        total_words: u64,
        #[serde(rename = "lowQualityFiltered")]
        low_quality_filtered: usize,
    },
    Progress {
        processed: u64,
        discovered: u64,
        queued: u64,
        pending: u64,
    },
    WorkerError {
        error: String,
    },
    JobCompleted {
        #[serde(rename = "jobId")]
        job_id: Uuid,
        #[serde(rename = "totalProcessed")]
        total_processed: u64,
        #[serde(rename = "totalDiscovered")]
        total_discovered: u64,
    },
    JobFailed {
        #[serde(rename = "jobId")]
        job_id: Uuid,
        error: String,
        #[serde(rename = "totalProcessed")]
        total_processed: Option<u64>,
        #[serde(rename = "totalDiscovered")]
        total_discovered: Option<u64>,
    },
    /// Gateway-synthesized, never stored.
    Reconnect {
        reason: String,
    },
    /// Gateway-synthesized placeholder for a poison-pill row; carries the
    /// offending event_id so clients can see the log advanced past it.
    ProcessingError {
        offending_event_id: String,
        error: String,
    },
    /// Gateway-synthesized, never stored.
    Heartbeat {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySummary {
    pub score: i32,
    pub reason: String,
}

impl EventPayload {
    /// The event type string as it appears in `event: {type}` on the wire
    /// and as the stored `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::StreamConnected { .. } => "stream_connected",
            EventPayload::UrlStarted { .. } => "url_started",
            EventPayload::UrlCrawled { .. } => "url_crawled",
            EventPayload::UrlsDiscovered { .. } => "urls_discovered",
            EventPayload::BatchStarted { .. } => "batch_started",
            EventPayload::BatchCompleted { .. } => "batch_completed",
            EventPayload::BatchError { .. } => "batch_error",
            EventPayload::SentToProcessing { .. } => "sent_to_processing",
            EventPayload::ContentProcessed { .. } => "content_processed",
            EventPayload::Progress { .. } => "progress",
            EventPayload::WorkerError { .. } => "worker_error",
            EventPayload::JobCompleted { .. } => "job_completed",
            EventPayload::JobFailed { .. } => "job_failed",
            EventPayload::Reconnect { .. } => "reconnect",
            EventPayload::ProcessingError { .. } => "processing_error",
            EventPayload::Heartbeat {} => "heartbeat",
        }
    }

    /// Whether this variant is ever persisted to the log (vs. gateway-only).
    pub fn is_storable(&self) -> bool {
        !matches!(
            self,
            EventPayload::Reconnect { .. }
                | EventPayload::Heartbeat {}
                | EventPayload::ProcessingError { .. }
        )
    }
}
