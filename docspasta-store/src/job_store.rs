//! Durable relational store: jobs, pages, content_chunks (SPEC_FULL.md §6.2).
//!
//! Every query is scoped by `user_id` AND `job_id` — no query in this
//! module may omit `user_id` when the caller is user-facing. The unique
//! `(job_id, url_hash)` constraint on `pages` is the dedup ledger of last
//! resort (SPEC_FULL.md §9): it is what makes the upsert in
//! `upsert_page` safe under concurrent workers racing the same URL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use docspasta_core::{ContentChunk, ContentType, CrawlConfig, Job, JobStatus, Page, PageStatus, ProgressSummary};

use crate::error::{Result, StoreError};

pub struct NewJob {
    pub id: Uuid,
    pub user_id: String,
    pub seed_url: String,
    pub config: CrawlConfig,
}

pub struct NewPage {
    pub job_id: Uuid,
    pub url: String,
    pub url_hash: String,
    pub depth: i32,
    pub discovered_from: Option<String>,
}

pub struct NewChunk {
    pub content: String,
    pub content_type: ContentType,
    pub chunk_index: i32,
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCounts {
    pub crawled: i64,
    pub error: i64,
    pub skipped: i64,
    pub pending: i64,
}

/// Relational job/page/chunk persistence, scoped per `user_id`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: NewJob) -> Result<Job>;
    async fn get_job(&self, user_id: &str, id: Uuid) -> Result<Option<Job>>;
    async fn list_recent_jobs(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Marks the job `running`. No-op (returns current version) if already
    /// past `pending`.
    async fn mark_running(&self, job_id: Uuid) -> Result<i64>;

    /// Terminal transition: sets status, optional message/final_markdown,
    /// `completed_at`, and bumps `state_version`. Only ever called from
    /// within a single-winner completion claim (see `SharedState`).
    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        final_markdown: Option<String>,
        message: Option<String>,
    ) -> Result<i64>;

    async fn bump_progress_summary(&self, job_id: Uuid, summary: ProgressSummary) -> Result<i64>;

    /// Upsert a Page row keyed by `(job_id, url_hash)`. Returns the row and
    /// whether it already existed in a terminal status (a cache hit —
    /// the worker should skip re-crawling it).
    async fn upsert_pending_page(&self, page: NewPage) -> Result<(Page, bool)>;

    async fn mark_page_crawled(
        &self,
        page_id: Uuid,
        http_status: i32,
        title: Option<String>,
        quality_score: i32,
        word_count: i32,
    ) -> Result<()>;

    async fn mark_page_error(&self, page_id: Uuid, http_status: Option<i32>, error: String) -> Result<()>;

    async fn mark_page_skipped(&self, page_id: Uuid, reason: String) -> Result<()>;

    async fn insert_chunks(&self, page_id: Uuid, chunks: Vec<NewChunk>) -> Result<()>;

    /// All crawled pages at or above `quality_threshold`, for finalization,
    /// ordered quality-ascending per SPEC_FULL.md §4.10.
    async fn crawled_pages_for_finalize(
        &self,
        job_id: Uuid,
        quality_threshold: i32,
    ) -> Result<Vec<(Page, Vec<ContentChunk>)>>;

    async fn page_counts(&self, job_id: Uuid) -> Result<PageCounts>;

    /// Sum of `word_count` across every crawled page, for the `/status`
    /// endpoint's `totalWords` field.
    async fn total_word_count(&self, job_id: Uuid) -> Result<i64>;

    /// All `url_hash` values already recorded for this job — used to
    /// rehydrate the in-process dedup set on worker/orchestrator restart
    /// (SPEC_FULL.md §9's durable-ledger-is-authoritative decision).
    async fn known_url_hashes(&self, job_id: Uuid) -> Result<Vec<String>>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    user_id: String,
    seed_url: String,
    config: Value,
    status: String,
    status_message: Option<String>,
    final_markdown: Option<String>,
    state_version: i64,
    progress_summary: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: self.id,
            user_id: self.user_id,
            seed_url: self.seed_url,
            config: serde_json::from_value(self.config)?,
            status: parse_status(&self.status),
            status_message: self.status_message,
            final_markdown: self.final_markdown,
            state_version: self.state_version,
            progress_summary: serde_json::from_value(self.progress_summary)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "partial" => JobStatus::Partial,
        _ => JobStatus::Pending,
    }
}

fn status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Partial => "partial",
    }
}

fn page_status_str(s: PageStatus) -> &'static str {
    match s {
        PageStatus::Pending => "pending",
        PageStatus::Crawled => "crawled",
        PageStatus::Error => "error",
        PageStatus::Skipped => "skipped",
    }
}

fn parse_page_status(s: &str) -> PageStatus {
    match s {
        "crawled" => PageStatus::Crawled,
        "error" => PageStatus::Error,
        "skipped" => PageStatus::Skipped,
        _ => PageStatus::Pending,
    }
}

fn content_type_str(t: ContentType) -> &'static str {
    match t {
        ContentType::Raw => "raw",
        ContentType::Markdown => "markdown",
        ContentType::Processed => "processed",
    }
}

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    job_id: Uuid,
    url: String,
    url_hash: String,
    title: Option<String>,
    status: String,
    http_status: Option<i32>,
    error: Option<String>,
    depth: i32,
    discovered_from: Option<String>,
    quality_score: i32,
    word_count: i32,
    created_at: DateTime<Utc>,
    crawled_at: Option<DateTime<Utc>>,
}

impl From<PageRow> for Page {
    fn from(r: PageRow) -> Self {
        Page {
            id: r.id,
            job_id: r.job_id,
            url: r.url,
            url_hash: r.url_hash,
            title: r.title,
            status: parse_page_status(&r.status),
            http_status: r.http_status,
            error: r.error,
            depth: r.depth,
            discovered_from: r.discovered_from,
            quality_score: r.quality_score,
            word_count: r.word_count,
            created_at: r.created_at,
            crawled_at: r.crawled_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    page_id: Uuid,
    content: String,
    content_type: String,
    chunk_index: i32,
    metadata: Value,
}

fn parse_content_type(s: &str) -> ContentType {
    match s {
        "raw" => ContentType::Raw,
        "processed" => ContentType::Processed,
        _ => ContentType::Markdown,
    }
}

impl From<ChunkRow> for ContentChunk {
    fn from(r: ChunkRow) -> Self {
        ContentChunk {
            id: r.id,
            page_id: r.page_id,
            content: r.content,
            content_type: parse_content_type(&r.content_type),
            chunk_index: r.chunk_index,
            metadata: r.metadata,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: NewJob) -> Result<Job> {
        let config_json = serde_json::to_value(&job.config)?;
        let row: JobRow = sqlx::query_as(
            r#"
            INSERT INTO jobs (id, user_id, seed_url, config, status, state_version, progress_summary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', 1, $5, now(), now())
            RETURNING id, user_id, seed_url, config, status, status_message, final_markdown,
                      state_version, progress_summary, created_at, updated_at, completed_at
            "#,
        )
        .bind(job.id)
        .bind(&job.user_id)
        .bind(&job.seed_url)
        .bind(&config_json)
        .bind(serde_json::to_value(ProgressSummary::default())?)
        .fetch_one(&self.pool)
        .await?;

        row.into_job()
    }

    async fn get_job(&self, user_id: &str, id: Uuid) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, seed_url, config, status, status_message, final_markdown,
                   state_version, progress_summary, created_at, updated_at, completed_at
            FROM jobs WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list_recent_jobs(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, seed_url, config, status, status_message, final_markdown,
                   state_version, progress_summary, created_at, updated_at, completed_at
            FROM jobs WHERE user_id = $1 AND created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE jobs SET status = 'running', state_version = state_version + 1, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING state_version
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or((0,));

        if row.0 == 0 {
            let current: (i64,) = sqlx::query_as("SELECT state_version FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;
            return Ok(current.0);
        }
        Ok(row.0)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        final_markdown: Option<String>,
        message: Option<String>,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = $2, final_markdown = $3, status_message = $4,
                state_version = state_version + 1, completed_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING state_version
            "#,
        )
        .bind(job_id)
        .bind(status_str(status))
        .bind(final_markdown)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn bump_progress_summary(&self, job_id: Uuid, summary: ProgressSummary) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE jobs
            SET progress_summary = $2, state_version = state_version + 1, updated_at = now()
            WHERE id = $1
            RETURNING state_version
            "#,
        )
        .bind(job_id)
        .bind(serde_json::to_value(summary)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn upsert_pending_page(&self, page: NewPage) -> Result<(Page, bool)> {
        let row: PageRow = sqlx::query_as(
            r#"
            INSERT INTO pages (id, job_id, url, url_hash, status, depth, discovered_from, quality_score, word_count, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, 0, 0, now())
            ON CONFLICT (job_id, url_hash) DO UPDATE SET url = EXCLUDED.url
            RETURNING id, job_id, url, url_hash, title, status, http_status, error, depth,
                      discovered_from, quality_score, word_count, created_at, crawled_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(page.job_id)
        .bind(&page.url)
        .bind(&page.url_hash)
        .bind(page.depth)
        .bind(&page.discovered_from)
        .fetch_one(&self.pool)
        .await?;

        let cache_hit = !matches!(parse_page_status(&row.status), PageStatus::Pending)
            || row.crawled_at.is_some();
        Ok((row.into(), cache_hit))
    }

    async fn mark_page_crawled(
        &self,
        page_id: Uuid,
        http_status: i32,
        title: Option<String>,
        quality_score: i32,
        word_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pages
            SET status = 'crawled', http_status = $2, title = $3, quality_score = $4,
                word_count = $5, crawled_at = now()
            WHERE id = $1
            "#,
        )
        .bind(page_id)
        .bind(http_status)
        .bind(title)
        .bind(quality_score)
        .bind(word_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_page_error(&self, page_id: Uuid, http_status: Option<i32>, error: String) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pages SET status = 'error', http_status = $2, error = $3, crawled_at = now()
            WHERE id = $1
            "#,
        )
        .bind(page_id)
        .bind(http_status)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_page_skipped(&self, page_id: Uuid, reason: String) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pages SET status = 'skipped', error = $2, crawled_at = now()
            WHERE id = $1
            "#,
        )
        .bind(page_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_chunks(&self, page_id: Uuid, chunks: Vec<NewChunk>) -> Result<()> {
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO content_chunks (id, page_id, content, content_type, chunk_index, metadata, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(page_id)
            .bind(&chunk.content)
            .bind(content_type_str(chunk.content_type))
            .bind(chunk.chunk_index)
            .bind(&chunk.metadata)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn crawled_pages_for_finalize(
        &self,
        job_id: Uuid,
        quality_threshold: i32,
    ) -> Result<Vec<(Page, Vec<ContentChunk>)>> {
        let page_rows: Vec<PageRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, url, url_hash, title, status, http_status, error, depth,
                   discovered_from, quality_score, word_count, created_at, crawled_at
            FROM pages
            WHERE job_id = $1 AND status = 'crawled' AND quality_score >= $2
            ORDER BY quality_score ASC, created_at ASC
            "#,
        )
        .bind(job_id)
        .bind(quality_threshold)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(page_rows.len());
        for row in page_rows {
            let page: Page = row.into();
            let chunk_rows: Vec<ChunkRow> = sqlx::query_as(
                r#"
                SELECT id, page_id, content, content_type, chunk_index, metadata
                FROM content_chunks WHERE page_id = $1 ORDER BY chunk_index ASC
                "#,
            )
            .bind(page.id)
            .fetch_all(&self.pool)
            .await?;
            let chunks = chunk_rows.into_iter().map(ContentChunk::from).collect();
            out.push((page, chunks));
        }
        Ok(out)
    }

    async fn page_counts(&self, job_id: Uuid) -> Result<PageCounts> {
        #[derive(sqlx::FromRow)]
        struct Row {
            status: String,
            count: i64,
        }
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT status, COUNT(*) as count FROM pages WHERE job_id = $1 GROUP BY status",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = PageCounts::default();
        for row in rows {
            match row.status.as_str() {
                "crawled" => counts.crawled = row.count,
                "error" => counts.error = row.count,
                "skipped" => counts.skipped = row.count,
                _ => counts.pending = row.count,
            }
        }
        Ok(counts)
    }

    async fn total_word_count(&self, job_id: Uuid) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(word_count)::bigint FROM pages WHERE job_id = $1 AND status = 'crawled'",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.unwrap_or(0))
    }

    async fn known_url_hashes(&self, job_id: Uuid) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT url_hash FROM pages WHERE job_id = $1")
                .bind(job_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(h,)| h).collect())
    }
}

impl From<StoreError> for docspasta_core::CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => docspasta_core::CoreError::NotFound,
            StoreError::Forbidden => docspasta_core::CoreError::Forbidden,
            other => docspasta_core::CoreError::Storage(other.to_string()),
        }
    }
}
