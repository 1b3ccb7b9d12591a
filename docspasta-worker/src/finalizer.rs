//! Finalizer (SPEC_FULL.md §4.10): assembles the consolidated Markdown
//! artifact and performs the single-winner terminal transition.

use std::sync::Arc;

use docspasta_core::event::EventPayload;
use docspasta_core::model::JobStatus;

use crate::crawler::WorkerContext;
use crate::error::{Result, WorkerError};

/// Attempts to finalize `job_id`. Safe to call from any number of workers
/// observing an empty queue concurrently — only the caller that wins the
/// per-job completion lock does the work; everyone else is a silent no-op.
/// This is the in-process stand-in for spec.md's "one atomic script over
/// two keys": the lock is held across both the terminal status write and
/// the completion event append.
pub async fn try_finalize(ctx: &Arc<WorkerContext>, job_id: uuid::Uuid, user_id: &str) -> Result<()> {
    let lock = ctx.shared.completion_lock(job_id).await;
    let mut claimed = lock.lock().await;
    if *claimed {
        return Ok(());
    }

    let job = ctx
        .job_store
        .get_job(user_id, job_id)
        .await?
        .ok_or(WorkerError::NotFound)?;
    if job.status.is_terminal() {
        *claimed = true;
        return Ok(());
    }

    finalize_job(ctx, job_id, user_id, job.config.quality_threshold).await?;
    *claimed = true;
    Ok(())
}

/// Pure finalization step, also callable directly by the orchestrator when
/// it observes `pending_pages == 0` for a job (spec.md §4.10's second
/// trigger). Idempotent: calling it twice on an already-terminal job is a
/// no-op, satisfying the round-trip law in spec.md §8.
pub async fn finalize_job(
    ctx: &Arc<WorkerContext>,
    job_id: uuid::Uuid,
    user_id: &str,
    quality_threshold: i32,
) -> Result<()> {
    let pages = ctx
        .job_store
        .crawled_pages_for_finalize(job_id, quality_threshold)
        .await?;
    let counts = ctx.job_store.page_counts(job_id).await?;

    let mut markdown = String::new();
    for (page, chunks) in &pages {
        let heading = page.title.clone().unwrap_or_else(|| page.url.clone());
        markdown.push_str(&format!("## {heading}\n\n"));
        for chunk in chunks {
            markdown.push_str(&chunk.content);
            markdown.push('\n');
        }
        markdown.push_str("\n---\n");
    }

    let snapshot = ctx.shared.progress_snapshot(job_id).await;

    if counts.crawled == 0 {
        ctx.job_store
            .complete_job(
                job_id,
                JobStatus::Failed,
                None,
                Some("no pages were successfully crawled".to_string()),
            )
            .await?;
        ctx.event_log
            .append(
                job_id,
                user_id,
                &EventPayload::JobFailed {
                    job_id,
                    error: "no pages were successfully crawled".to_string(),
                    total_processed: Some(snapshot.processed),
                    total_discovered: Some(snapshot.discovered),
                },
            )
            .await?;
        return Ok(());
    }

    let status = if counts.error > 0 {
        JobStatus::Partial
    } else {
        JobStatus::Completed
    };

    ctx.job_store
        .complete_job(job_id, status, Some(markdown), None)
        .await?;
    ctx.event_log
        .append(
            job_id,
            user_id,
            &EventPayload::JobCompleted {
                job_id,
                total_processed: snapshot.processed,
                total_discovered: snapshot.discovered,
            },
        )
        .await?;

    Ok(())
}
