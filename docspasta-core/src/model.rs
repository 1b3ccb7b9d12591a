//! Durable data model: Job, Page, ContentChunk, Task.
//!
//! Mirrors the relational schema in SPEC_FULL.md §6.2. These types are
//! shared by the store, worker, and server crates so there is exactly one
//! definition of "what a job looks like" across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CrawlConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub seed_url: String,
    pub config: CrawlConfig,
    pub status: JobStatus,
    pub status_message: Option<String>,
    pub final_markdown: Option<String>,
    /// Strictly increases on every persisted state change. Used by SSE as a
    /// resume fallback and by clients for optimistic reconciliation.
    pub state_version: i64,
    pub progress_summary: ProgressSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub discovered: u64,
    pub queued: u64,
    pub processed: u64,
    pub filtered: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Crawled,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub status: PageStatus,
    pub http_status: Option<i32>,
    pub error: Option<String>,
    pub depth: i32,
    pub discovered_from: Option<String>,
    pub quality_score: i32,
    pub word_count: i32,
    pub created_at: DateTime<Utc>,
    pub crawled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Raw,
    Markdown,
    Processed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    pub id: Uuid,
    pub page_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub chunk_index: i32,
    pub metadata: serde_json::Value,
}

/// Transient unit of work. Lives only in the work queue, never persisted on
/// its own (a Page row is upserted for it the moment a worker pops it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub url: String,
    pub depth: i32,
}
