//! In-memory test doubles for `JobStore` and `EventLog`, so the worker and
//! server integration suites run without a live Postgres instance — mirrors
//! this codebase's `#[cfg(test)]`-adjacent `testing.rs`/`fixtures.rs` split.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use docspasta_core::event::EventPayload;
use docspasta_core::model::{ContentChunk, Job, JobStatus, Page, PageStatus, ProgressSummary};
use docspasta_extract::{ExtractedPage, PageFetcher};
use docspasta_store::event_log::{EventLog, StoredEvent};
use docspasta_store::job_store::{JobStore, NewChunk, NewJob, NewPage, PageCounts};
use docspasta_store::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// Fixed URL→response fake satisfying `PageFetcher`, so worker tests never
/// make a real network call. URLs not present in the map are treated as a
/// 404 with no body.
#[derive(Default)]
pub struct FakeFetcher {
    responses: std::collections::HashMap<String, ExtractedPage>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, page: ExtractedPage) -> Self {
        self.responses.insert(url.into(), page);
        self
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_and_extract(
        &self,
        url: &str,
        _timeout: std::time::Duration,
    ) -> docspasta_extract::error::Result<ExtractedPage> {
        Ok(self.responses.get(url).cloned().unwrap_or(ExtractedPage {
            http_status: 404,
            title: None,
            markdown: None,
            raw_body_len: 0,
            extracted_links: Vec::new(),
        }))
    }
}

#[derive(Default)]
pub struct FakeJobStore {
    jobs: DashMap<Uuid, Job>,
    pages: DashMap<Uuid, Page>,
    chunks: DashMap<Uuid, Vec<ContentChunk>>,
}

impl FakeJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn create_job(&self, job: NewJob) -> Result<Job> {
        let now = Utc::now();
        let record = Job {
            id: job.id,
            user_id: job.user_id,
            seed_url: job.seed_url,
            config: job.config,
            status: JobStatus::Pending,
            status_message: None,
            final_markdown: None,
            state_version: 1,
            progress_summary: ProgressSummary::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_job(&self, user_id: &str, id: Uuid) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .get(&id)
            .filter(|j| j.user_id == user_id)
            .map(|j| j.clone()))
    }

    async fn list_recent_jobs(&self, user_id: &str, since: chrono::DateTime<Utc>) -> Result<Vec<Job>> {
        let mut out: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| j.user_id == user_id && j.created_at >= since)
            .map(|j| j.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<i64> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        if entry.status == JobStatus::Pending {
            entry.status = JobStatus::Running;
            entry.state_version += 1;
            entry.updated_at = Utc::now();
        }
        Ok(entry.state_version)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        final_markdown: Option<String>,
        message: Option<String>,
    ) -> Result<i64> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        entry.status = status;
        entry.final_markdown = final_markdown;
        entry.status_message = message;
        entry.state_version += 1;
        let now = Utc::now();
        entry.updated_at = now;
        entry.completed_at = Some(now);
        Ok(entry.state_version)
    }

    async fn bump_progress_summary(&self, job_id: Uuid, summary: ProgressSummary) -> Result<i64> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        entry.progress_summary = summary;
        entry.state_version += 1;
        entry.updated_at = Utc::now();
        Ok(entry.state_version)
    }

    async fn upsert_pending_page(&self, page: NewPage) -> Result<(Page, bool)> {
        if let Some(existing) = self
            .pages
            .iter()
            .find(|p| p.job_id == page.job_id && p.url_hash == page.url_hash)
        {
            let cache_hit = existing.status != PageStatus::Pending;
            return Ok((existing.clone(), cache_hit));
        }
        let record = Page {
            id: Uuid::new_v4(),
            job_id: page.job_id,
            url: page.url,
            url_hash: page.url_hash,
            title: None,
            status: PageStatus::Pending,
            http_status: None,
            error: None,
            depth: page.depth,
            discovered_from: page.discovered_from,
            quality_score: 0,
            word_count: 0,
            created_at: Utc::now(),
            crawled_at: None,
        };
        self.pages.insert(record.id, record.clone());
        Ok((record, false))
    }

    async fn mark_page_crawled(
        &self,
        page_id: Uuid,
        http_status: i32,
        title: Option<String>,
        quality_score: i32,
        word_count: i32,
    ) -> Result<()> {
        let mut entry = self.pages.get_mut(&page_id).ok_or(StoreError::NotFound)?;
        entry.status = PageStatus::Crawled;
        entry.http_status = Some(http_status);
        entry.title = title;
        entry.quality_score = quality_score;
        entry.word_count = word_count;
        entry.crawled_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_page_error(&self, page_id: Uuid, http_status: Option<i32>, error: String) -> Result<()> {
        let mut entry = self.pages.get_mut(&page_id).ok_or(StoreError::NotFound)?;
        entry.status = PageStatus::Error;
        entry.http_status = http_status;
        entry.error = Some(error);
        entry.crawled_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_page_skipped(&self, page_id: Uuid, reason: String) -> Result<()> {
        let mut entry = self.pages.get_mut(&page_id).ok_or(StoreError::NotFound)?;
        entry.status = PageStatus::Skipped;
        entry.error = Some(reason);
        entry.crawled_at = Some(Utc::now());
        Ok(())
    }

    async fn insert_chunks(&self, page_id: Uuid, chunks: Vec<NewChunk>) -> Result<()> {
        let mut stored: Vec<ContentChunk> = chunks
            .into_iter()
            .map(|c| ContentChunk {
                id: Uuid::new_v4(),
                page_id,
                content: c.content,
                content_type: c.content_type,
                chunk_index: c.chunk_index,
                metadata: c.metadata,
            })
            .collect();
        self.chunks.entry(page_id).or_default().append(&mut stored);
        Ok(())
    }

    async fn crawled_pages_for_finalize(
        &self,
        job_id: Uuid,
        quality_threshold: i32,
    ) -> Result<Vec<(Page, Vec<ContentChunk>)>> {
        let mut pages: Vec<Page> = self
            .pages
            .iter()
            .filter(|p| {
                p.job_id == job_id
                    && p.status == PageStatus::Crawled
                    && p.quality_score >= quality_threshold
            })
            .map(|p| p.clone())
            .collect();
        pages.sort_by(|a, b| {
            a.quality_score
                .cmp(&b.quality_score)
                .then(a.created_at.cmp(&b.created_at))
        });
        let out = pages
            .into_iter()
            .map(|p| {
                let mut chunks = self.chunks.get(&p.id).map(|c| c.clone()).unwrap_or_default();
                chunks.sort_by_key(|c| c.chunk_index);
                (p, chunks)
            })
            .collect();
        Ok(out)
    }

    async fn page_counts(&self, job_id: Uuid) -> Result<PageCounts> {
        let mut counts = PageCounts::default();
        for page in self.pages.iter().filter(|p| p.job_id == job_id) {
            match page.status {
                PageStatus::Crawled => counts.crawled += 1,
                PageStatus::Error => counts.error += 1,
                PageStatus::Skipped => counts.skipped += 1,
                PageStatus::Pending => counts.pending += 1,
            }
        }
        Ok(counts)
    }

    async fn total_word_count(&self, job_id: Uuid) -> Result<i64> {
        Ok(self
            .pages
            .iter()
            .filter(|p| p.job_id == job_id && p.status == PageStatus::Crawled)
            .map(|p| p.word_count as i64)
            .sum())
    }

    async fn known_url_hashes(&self, job_id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .pages
            .iter()
            .filter(|p| p.job_id == job_id)
            .map(|p| p.url_hash.clone())
            .collect())
    }
}

pub struct FakeEventLog {
    events: Mutex<Vec<StoredEvent>>,
    next_seq: AtomicI64,
}

impl Default for FakeEventLog {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            next_seq: AtomicI64::new(1),
        }
    }
}

impl FakeEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: push a row with an already-serialized payload, used to
    /// simulate a poison-pill (malformed) event in the log.
    pub fn push_raw(&self, job_id: Uuid, user_id: &str, event_type: &str, payload: serde_json::Value) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        events.push(StoredEvent {
            event_id: seq.to_string(),
            job_id,
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        });
        seq.to_string()
    }
}

#[async_trait]
impl EventLog for FakeEventLog {
    async fn append(&self, job_id: Uuid, user_id: &str, payload: &EventPayload) -> Result<String> {
        let full = serde_json::to_value(payload).map_err(StoreError::Serde)?;
        let payload_json = full.get("payload").cloned().unwrap_or(full);
        Ok(self.push_raw(job_id, user_id, payload.type_name(), payload_json))
    }

    async fn read_from(&self, job_id: Uuid, cursor: i64, limit: i64) -> Result<Vec<StoredEvent>> {
        let events = self.events.lock().unwrap();
        let out = events
            .iter()
            .filter(|e| e.job_id == job_id && e.event_id.parse::<i64>().unwrap_or(0) >= cursor)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(out)
    }
}
