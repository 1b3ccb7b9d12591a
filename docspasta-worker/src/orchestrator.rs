//! Orchestrator / Job Manager (SPEC_FULL.md §4.9): job lifecycle operations
//! and worker spawning/respawning. Mirrors the teacher's pattern of a single
//! struct wrapping shared dependencies that handlers and background tasks
//! both call into (`rootsignal_core::ServerDeps`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use docspasta_core::config::CrawlConfig;
use docspasta_core::model::{Job, JobStatus, Task};
use docspasta_core::normalize::{fingerprint, normalize};
use docspasta_extract::PageFetcher;
use docspasta_store::job_store::NewJob;
use docspasta_store::shared_state::ProgressField;
use docspasta_store::{EventLog, JobStore, NewPage, SharedState};

use crate::crawler::{run_worker, WorkerContext};
use crate::error::{Result, WorkerError};
use crate::finalizer;

const MAX_BATCH_STATE_IDS: usize = 20;
const MAX_RECENT_EVENTS: i64 = 10;

/// Maximum number of in-flight workers ever spawned for one `create_job`
/// call before respawns take over — mirrors `config.initial_workers`.
pub struct Orchestrator {
    ctx: Arc<WorkerContext>,
}

pub struct JobStateSummary {
    pub status: JobStatus,
    pub total_processed: u64,
    pub total_discovered: u64,
    pub recent_activity: Vec<serde_json::Value>,
    pub last_event_id: Option<String>,
    pub error: Option<String>,
}

pub struct BatchJobStates {
    pub states: HashMap<Uuid, JobStateSummary>,
    pub not_found: Vec<Uuid>,
}

impl Orchestrator {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        event_log: Arc<dyn EventLog>,
        shared: Arc<dyn SharedState>,
        extractor: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            ctx: Arc::new(WorkerContext {
                job_store,
                event_log,
                shared,
                extractor,
            }),
        }
    }

    pub fn context(&self) -> Arc<WorkerContext> {
        self.ctx.clone()
    }

    /// Validates `seed_url`, creates the job row and seed Page, enqueues the
    /// seed task, and spawns `config.initial_workers` fire-and-forget
    /// workers before transitioning the job to `running`.
    pub async fn create_job(
        &self,
        user_id: &str,
        seed_url: &str,
        config: Option<CrawlConfig>,
    ) -> Result<Job> {
        validate_seed_url(seed_url)?;
        let config = config.unwrap_or_default();

        let job_id = Uuid::new_v4();
        self.ctx
            .job_store
            .create_job(NewJob {
                id: job_id,
                user_id: user_id.to_string(),
                seed_url: seed_url.to_string(),
                config: config.clone(),
            })
            .await?;

        let normalized_seed = normalize(seed_url, None)
            .map_err(|e| WorkerError::BadRequest(format!("invalid seed url: {e}")))?;
        let hash = fingerprint(&normalized_seed);

        self.ctx.shared.dedup_try_admit(job_id, &hash).await;
        self.ctx
            .job_store
            .upsert_pending_page(NewPage {
                job_id,
                url: seed_url.to_string(),
                url_hash: hash,
                depth: 0,
                discovered_from: None,
            })
            .await?;
        self.ctx
            .shared
            .enqueue_many(
                job_id,
                vec![Task {
                    task_id: Uuid::new_v4(),
                    url: seed_url.to_string(),
                    depth: 0,
                }],
            )
            .await;
        self.ctx.shared.progress_incr(job_id, ProgressField::Discovered, 1).await;

        self.ctx.job_store.mark_running(job_id).await?;

        for _ in 0..config.initial_workers.max(1) {
            self.spawn_worker(job_id, user_id.to_string());
        }

        self.ctx
            .job_store
            .get_job(user_id, job_id)
            .await?
            .ok_or(WorkerError::NotFound)
    }

    pub async fn get_job(&self, user_id: &str, id: Uuid) -> Result<Option<Job>> {
        Ok(self.ctx.job_store.get_job(user_id, id).await?)
    }

    pub async fn list_recent_jobs(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<Job>> {
        Ok(self.ctx.job_store.list_recent_jobs(user_id, since).await?)
    }

    /// Flips a non-terminal job out of `running`. Workers observe this on
    /// their next status check and exit without re-enqueuing or
    /// decrementing progress incorrectly.
    pub async fn cancel_job(&self, user_id: &str, id: Uuid) -> Result<()> {
        let job = self
            .ctx
            .job_store
            .get_job(user_id, id)
            .await?
            .ok_or(WorkerError::NotFound)?;
        if job.status.is_terminal() {
            return Ok(());
        }
        self.ctx
            .job_store
            .complete_job(id, JobStatus::Failed, None, Some("cancelled by user".to_string()))
            .await?;
        self.ctx.shared.clear_job(id).await;
        Ok(())
    }

    /// Bounded to `<=20` ids per spec.md §4.9. Each job's `recentActivity`
    /// is its last `MAX_RECENT_EVENTS` events, for UI restoration on
    /// reconnect.
    pub async fn batch_job_states(&self, user_id: &str, ids: Vec<Uuid>) -> Result<BatchJobStates> {
        if ids.len() > MAX_BATCH_STATE_IDS {
            return Err(WorkerError::BadRequest(format!(
                "at most {MAX_BATCH_STATE_IDS} job ids allowed, got {}",
                ids.len()
            )));
        }

        let mut states = HashMap::new();
        let mut not_found = Vec::new();

        for id in ids {
            let Some(job) = self.ctx.job_store.get_job(user_id, id).await? else {
                not_found.push(id);
                continue;
            };
            let events = self.ctx.event_log.read_from(id, 0, 10_000).await?;
            let recent: Vec<_> = events
                .iter()
                .rev()
                .take(MAX_RECENT_EVENTS as usize)
                .map(|e| serde_json::json!({ "type": e.event_type, "payload": e.payload, "eventId": e.event_id }))
                .collect();
            let last_event_id = events.last().map(|e| e.event_id.clone());

            states.insert(
                id,
                JobStateSummary {
                    status: job.status,
                    total_processed: job.progress_summary.processed,
                    total_discovered: job.progress_summary.discovered,
                    recent_activity: recent,
                    last_event_id,
                    error: job.status_message,
                },
            );
        }

        Ok(BatchJobStates { states, not_found })
    }

    /// Fire-and-forget worker spawn, shared by `create_job` and the
    /// respawn path (spec.md §4.8: "the orchestrator or the exiting worker
    /// itself"). Failures to respawn are logged, never propagated.
    pub fn spawn_worker(&self, job_id: Uuid, user_id: String) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            match run_worker(ctx.clone(), job_id, user_id.clone(), cancel).await {
                Ok(outcome) => {
                    info!(job_id = %job_id, ?outcome, "worker exited");
                    maybe_respawn(&ctx, job_id, &user_id).await;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "worker exited with error");
                    ctx.event_log
                        .append(job_id, &user_id, &docspasta_core::event::EventPayload::WorkerError { error: e.to_string() })
                        .await
                        .ok();
                }
            }
        });
    }
}

async fn maybe_respawn(ctx: &Arc<WorkerContext>, job_id: Uuid, user_id: &str) {
    let Ok(Some(job)) = ctx.job_store.get_job(user_id, job_id).await else {
        return;
    };
    if job.status != JobStatus::Running {
        return;
    }
    if ctx.shared.queue_is_empty(job_id).await {
        finalizer::try_finalize(ctx, job_id, user_id).await.ok();
        return;
    }
    let workers = ctx.shared.worker_count(job_id).await as usize;
    if workers >= job.config.max_workers_per_job {
        return;
    }

    let ctx = ctx.clone();
    let user_id = user_id.to_string();
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        if let Err(e) = run_worker(ctx, job_id, user_id, cancel).await {
            warn!(job_id = %job_id, error = %e, "respawned worker exited with error");
        }
    });
}

fn validate_seed_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).map_err(|e| WorkerError::BadRequest(format!("invalid url: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(WorkerError::BadRequest("url must use http or https scheme".to_string()));
    }
    let Some(host) = parsed.host_str() else {
        return Err(WorkerError::BadRequest("url must have a host".to_string()));
    };
    let lower = host.to_lowercase();
    if lower == "localhost" || lower.ends_with(".local") || lower.ends_with(".internal") {
        return Err(WorkerError::BadRequest("urls pointing to internal hosts are not allowed".to_string()));
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        if is_private_or_loopback(ip) {
            return Err(WorkerError::BadRequest(
                "urls pointing to private/loopback addresses are not allowed".to_string(),
            ));
        }
    }
    Ok(())
}

fn is_private_or_loopback(ip: std::net::IpAddr) -> bool {
    match ip {
        std::net::IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        std::net::IpAddr::V6(v6) => v6.is_loopback(),
    }
}
