//! Crawl Worker (SPEC_FULL.md §4.8): pops batches off the shared queue,
//! fetches/extracts/scores concurrently within a batch, writes results, and
//! discovers + enqueues new URLs. Bounded-concurrency fan-out within a batch
//! uses a `JoinSet` racing a `CancellationToken`, adapted from the
//! crawler-worker pattern of batching over a frontier rather than a single
//! stack — grounded on this codebase's `ChromeScraper`'s `Semaphore`-bounded
//! concurrency idiom (`rootsignal-scout/src/pipeline/scraper.rs`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use docspasta_core::event::{EventPayload, QualitySummary};
use docspasta_core::model::{ContentType, JobStatus, Task};
use docspasta_core::normalize::{fingerprint, is_admissible, normalize, seed_path_prefix};
use docspasta_core::quality::{score, ScoreInput};
use docspasta_extract::PageFetcher;
use docspasta_store::job_store::{NewChunk, NewPage};
use docspasta_store::shared_state::ProgressField;
use docspasta_store::{EventLog, JobStore, SharedState};

use crate::error::{Result, WorkerError};
use crate::finalizer;

/// Per-invocation bounded batch cap (spec.md §4.8: "default ~10").
const MAX_BATCHES_PER_INVOCATION: u32 = 10;
/// How many tasks a single `pop_batch` call claims.
const BATCH_SIZE: usize = 10;
/// Per-invocation wall-clock budget (spec.md §4.8: "~50s of a 60s budget").
const WORKER_WALL_CLOCK: Duration = Duration::from_secs(50);
/// Inter-batch cooperative delay fallback when a job leaves `delay_ms` unset.
const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    QueueEmpty,
    NotRunning,
    BatchCapReached,
    WallClockExceeded,
}

pub struct WorkerContext {
    pub job_store: Arc<dyn JobStore>,
    pub event_log: Arc<dyn EventLog>,
    pub shared: Arc<dyn SharedState>,
    pub extractor: Arc<dyn PageFetcher>,
}

/// Runs one worker invocation to completion. Increments the worker counter
/// on entry and decrements it on every exit path (§4.8's "guaranteed
/// decrement"), then evaluates whether this worker is the one to trigger
/// finalization.
///
/// Rehydrates the in-process dedup set from the durable `pages` table
/// before touching the queue: the table, not the set, is the authority on
/// which URLs this job has already admitted, so a worker picking up a job
/// after a process restart must not re-admit (and re-crawl) everything the
/// table already has a row for.
pub async fn run_worker(
    ctx: Arc<WorkerContext>,
    job_id: Uuid,
    user_id: String,
    cancel: CancellationToken,
) -> Result<WorkerOutcome> {
    ctx.shared.worker_incr(job_id).await;

    let outcome = match ctx.job_store.known_url_hashes(job_id).await {
        Ok(hashes) => {
            ctx.shared.rehydrate_dedup(job_id, hashes).await;
            run_batches(&ctx, job_id, &user_id, &cancel).await
        }
        Err(e) => Err(WorkerError::from(e)),
    };

    let remaining = ctx.shared.worker_decr(job_id).await;

    let queue_empty = ctx.shared.queue_is_empty(job_id).await;
    if queue_empty && remaining == 0 {
        finalizer::try_finalize(&ctx, job_id, &user_id).await?;
    }

    outcome
}

async fn run_batches(
    ctx: &Arc<WorkerContext>,
    job_id: Uuid,
    user_id: &str,
    cancel: &CancellationToken,
) -> Result<WorkerOutcome> {
    let deadline = Instant::now() + WORKER_WALL_CLOCK;
    let mut batches = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(WorkerOutcome::NotRunning);
        }
        if Instant::now() >= deadline {
            return Ok(WorkerOutcome::WallClockExceeded);
        }
        if batches >= MAX_BATCHES_PER_INVOCATION {
            return Ok(WorkerOutcome::BatchCapReached);
        }

        let job = ctx
            .job_store
            .get_job(user_id, job_id)
            .await?
            .ok_or(WorkerError::NotFound)?;
        if job.status != JobStatus::Running {
            return Ok(WorkerOutcome::NotRunning);
        }

        let tasks = ctx.shared.pop_batch(job_id, BATCH_SIZE).await;
        if tasks.is_empty() {
            if ctx.shared.queue_is_empty(job_id).await {
                return Ok(WorkerOutcome::QueueEmpty);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }

        batches += 1;
        run_batch(ctx, job_id, user_id, &job.seed_url, &job.config, tasks).await?;

        let delay = Duration::from_millis(job.config.delay_ms);
        tokio::time::sleep(if delay.is_zero() { DEFAULT_INTER_BATCH_DELAY } else { delay }).await;
    }
}

async fn run_batch(
    ctx: &Arc<WorkerContext>,
    job_id: Uuid,
    user_id: &str,
    seed_url: &str,
    config: &docspasta_core::CrawlConfig,
    tasks: Vec<Task>,
) -> Result<()> {
    let in_scope: Vec<Task> = tasks
        .into_iter()
        .filter(|t| t.depth <= config.max_depth)
        .collect();
    if in_scope.is_empty() {
        return Ok(());
    }

    ctx.event_log
        .append(
            job_id,
            user_id,
            &EventPayload::BatchStarted {
                count: in_scope.len(),
                urls: in_scope.iter().map(|t| t.url.clone()).collect(),
            },
        )
        .await?;

    let seed = normalize(seed_url, None).map_err(|e| WorkerError::Other(anyhow::anyhow!(e.to_string())))?;
    let seed_prefix =
        seed_path_prefix(seed_url).map_err(|e| WorkerError::Other(anyhow::anyhow!(e.to_string())))?;
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut join_set: JoinSet<BatchItemResult> = JoinSet::new();

    for task in in_scope {
        let url_hash = fingerprint(&normalize(&task.url, None).unwrap_or(seed.clone()));
        let (page, cache_hit) = ctx
            .job_store
            .upsert_pending_page(NewPage {
                job_id,
                url: task.url.clone(),
                url_hash,
                depth: task.depth,
                discovered_from: None,
            })
            .await?;

        if cache_hit {
            join_set.spawn(async move { BatchItemResult::CacheHit { page_id: page.id, url: task.url } });
            continue;
        }

        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let timeout = Duration::from_secs(config.per_page_timeout_secs.max(1));
        let depth = task.depth;
        let url = task.url.clone();
        let page_id = page.id;

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            ctx.event_log
                .append(job_id, user_id, &EventPayload::UrlStarted { url: url.clone(), depth })
                .await
                .ok();

            match ctx.extractor.fetch_and_extract(&url, timeout).await {
                Ok(extracted) => BatchItemResult::Fetched { page_id, url, depth, extracted },
                Err(e) => BatchItemResult::Failed { page_id, url, error: e.to_string() },
            }
        });
    }

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut from_cache = 0usize;
    let mut discovered_total = 0usize;

    while let Some(joined) = join_set.join_next().await {
        let item = match joined {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "worker task panicked");
                failed += 1;
                continue;
            }
        };

        match item {
            BatchItemResult::CacheHit { .. } => {
                from_cache += 1;
            }
            BatchItemResult::Failed { page_id, url, error } => {
                ctx.job_store.mark_page_error(page_id, None, error.clone()).await?;
                ctx.shared.progress_incr(job_id, ProgressField::Failed, 1).await;
                failed += 1;
                ctx.event_log
                    .append(
                        job_id,
                        user_id,
                        &EventPayload::UrlCrawled {
                            url,
                            success: false,
                            content_length: 0,
                            title: None,
                            quality: QualitySummary { score: 0, reason: error },
                        },
                    )
                    .await?;
            }
            BatchItemResult::Fetched { page_id, url, depth, extracted } => {
                let markdown = extracted.markdown.clone().unwrap_or_default();
                let report = score(&ScoreInput {
                    http_status: extracted.http_status,
                    body_len: extracted.raw_body_len,
                    markdown: &markdown,
                    url: &url,
                    title: extracted.title.as_deref(),
                });
                let word_count = markdown.split_whitespace().count() as i32;

                if markdown.is_empty() {
                    ctx.job_store
                        .mark_page_skipped(page_id, "no extractable content".to_string())
                        .await?;
                    ctx.shared.progress_incr(job_id, ProgressField::Skipped, 1).await;
                } else {
                    ctx.job_store
                        .mark_page_crawled(
                            page_id,
                            extracted.http_status as i32,
                            extracted.title.clone(),
                            report.score,
                            word_count,
                        )
                        .await?;
                    ctx.job_store
                        .insert_chunks(
                            page_id,
                            vec![NewChunk {
                                content: markdown.clone(),
                                content_type: ContentType::Markdown,
                                chunk_index: 0,
                                metadata: serde_json::json!({ "url": url }),
                            }],
                        )
                        .await?;
                    ctx.shared.progress_incr(job_id, ProgressField::Processed, 1).await;
                    ctx.event_log
                        .append(
                            job_id,
                            user_id,
                            &EventPayload::SentToProcessing { url: url.clone(), word_count: word_count as usize },
                        )
                        .await?;
                }

                completed += 1;
                ctx.event_log
                    .append(
                        job_id,
                        user_id,
                        &EventPayload::UrlCrawled {
                            url: url.clone(),
                            success: !markdown.is_empty(),
                            content_length: extracted.raw_body_len,
                            title: extracted.title.clone(),
                            quality: QualitySummary { score: report.score, reason: report.reason.clone() },
                        },
                    )
                    .await?;

                let discovered = discover_links(
                    ctx,
                    job_id,
                    user_id,
                    &seed,
                    &seed_prefix,
                    config,
                    &url,
                    depth,
                    &extracted.extracted_links,
                )
                .await?;
                discovered_total += discovered;
            }
        }
    }

    ctx.event_log
        .append(
            job_id,
            user_id,
            &EventPayload::BatchCompleted { completed, failed, discovered: discovered_total, from_cache },
        )
        .await?;

    let snapshot = ctx.shared.progress_snapshot(job_id).await;
    ctx.job_store.bump_progress_summary(job_id, snapshot.clone()).await?;
    ctx.event_log
        .append(
            job_id,
            user_id,
            &EventPayload::Progress {
                processed: snapshot.processed,
                discovered: snapshot.discovered,
                queued: snapshot.queued,
                pending: snapshot.queued.saturating_sub(snapshot.processed + snapshot.failed + snapshot.skipped),
            },
        )
        .await?;

    Ok(())
}

enum BatchItemResult {
    CacheHit { page_id: Uuid, url: String },
    Fetched { page_id: Uuid, url: String, depth: i32, extracted: docspasta_extract::ExtractedPage },
    Failed { page_id: Uuid, url: String, error: String },
}

async fn discover_links(
    ctx: &Arc<WorkerContext>,
    job_id: Uuid,
    user_id: &str,
    seed: &url::Url,
    seed_prefix: &str,
    config: &docspasta_core::CrawlConfig,
    source_url: &str,
    source_depth: i32,
    raw_links: &[String],
) -> Result<usize> {
    if raw_links.is_empty() || source_depth + 1 > config.max_depth {
        return Ok(0);
    }

    let mut admitted_tasks = Vec::new();
    let mut admitted_urls = Vec::new();
    let mut budget = (config.max_pages as usize).saturating_sub(ctx.shared.dedup_count(job_id).await);

    for raw in raw_links {
        let Ok(normalized) = normalize(raw, Some(seed)) else {
            continue;
        };
        if !is_admissible(&normalized, seed, seed_prefix, config.follow_external_links) {
            continue;
        }
        let hash = fingerprint(&normalized);
        ctx.shared.progress_incr(job_id, ProgressField::Discovered, 1).await;
        if budget == 0 {
            ctx.shared.progress_incr(job_id, ProgressField::Filtered, 1).await;
            continue;
        }
        if !ctx.shared.dedup_try_admit(job_id, &hash).await {
            ctx.shared.progress_incr(job_id, ProgressField::Filtered, 1).await;
            continue;
        }
        budget -= 1;
        admitted_urls.push(normalized.to_string());
        admitted_tasks.push(Task {
            task_id: Uuid::new_v4(),
            url: normalized.to_string(),
            depth: source_depth + 1,
        });
    }

    if admitted_tasks.is_empty() {
        return Ok(0);
    }

    let count = admitted_tasks.len();
    ctx.shared.enqueue_many(job_id, admitted_tasks).await;
    let snapshot = ctx.shared.progress_snapshot(job_id).await;
    ctx.event_log
        .append(
            job_id,
            user_id,
            &EventPayload::UrlsDiscovered {
                source_url: source_url.to_string(),
                discovered_urls: admitted_urls,
                count,
                total_discovered: snapshot.discovered,
            },
        )
        .await?;

    info!(job_id = %job_id, source_url, count, "discovered and admitted links");
    Ok(count)
}
