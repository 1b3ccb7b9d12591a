//! In-process stand-in for the abstract key-value/stream store
//! (SPEC_FULL.md §6.2, §9): dedup set, work queue, progress counters,
//! worker counter, and the single-winner completion primitive, all keyed
//! by `job_id` and backed by `DashMap` rather than Redis.
//!
//! The durable `pages` table (`job_store::JobStore`) is the ledger of
//! record — `rehydrate_dedup` replays `known_url_hashes` into this map on
//! worker startup so a restart never forgets what a job has already seen.
//! This trait boundary is exactly where a Redis-backed implementation
//! would plug in for a multi-process deployment.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use docspasta_core::model::{ProgressSummary, Task};

#[derive(Debug, Clone, Copy)]
pub enum ProgressField {
    Discovered,
    Queued,
    Processed,
    Filtered,
    Skipped,
    Failed,
}

#[async_trait]
pub trait SharedState: Send + Sync {
    /// Atomically records `url_hash` as seen for `job_id`. Returns `true`
    /// if this is the first time (the caller should admit the URL), `false`
    /// if another worker already claimed it.
    async fn dedup_try_admit(&self, job_id: Uuid, url_hash: &str) -> bool;

    /// Seeds the dedup set from durably-known hashes without treating them
    /// as newly admitted (used on restart).
    async fn rehydrate_dedup(&self, job_id: Uuid, url_hashes: Vec<String>);

    /// Total distinct URLs admitted for `job_id` so far (seed plus every
    /// link that has won `dedup_try_admit`). Callers use this against
    /// `max_pages` to cap admission once the budget is spent.
    async fn dedup_count(&self, job_id: Uuid) -> usize;

    async fn enqueue_many(&self, job_id: Uuid, tasks: Vec<Task>);

    /// Pops up to `n` tasks. Empty result means either the queue is
    /// drained or momentarily starved; callers distinguish via
    /// `queue_is_empty`.
    async fn pop_batch(&self, job_id: Uuid, n: usize) -> Vec<Task>;

    async fn queue_is_empty(&self, job_id: Uuid) -> bool;

    async fn progress_incr(&self, job_id: Uuid, field: ProgressField, by: u64);

    async fn progress_snapshot(&self, job_id: Uuid) -> ProgressSummary;

    async fn worker_incr(&self, job_id: Uuid) -> u64;

    async fn worker_decr(&self, job_id: Uuid) -> u64;

    async fn worker_count(&self, job_id: Uuid) -> u64;

    /// Returns the per-job completion lock, a `Mutex<bool>` guarding
    /// whether completion has already been claimed. The caller must hold
    /// the lock across *both* the terminal status write and the
    /// completion event-log append — that's what makes the pair atomic
    /// with respect to every other worker racing the same job — then set
    /// the flag to `true` before releasing it. Checking `*guard` before
    /// doing that work tells the caller whether it won the race.
    async fn completion_lock(&self, job_id: Uuid) -> Arc<Mutex<bool>>;

    /// Drops all per-job state. Called once finalization has committed.
    async fn clear_job(&self, job_id: Uuid);
}

#[derive(Default)]
struct JobCounters {
    discovered: AtomicU64,
    queued: AtomicU64,
    processed: AtomicU64,
    filtered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    workers: AtomicU64,
}

pub struct InMemorySharedState {
    dedup: DashMap<Uuid, DashSet<String>>,
    queues: DashMap<Uuid, Mutex<VecDeque<Task>>>,
    counters: DashMap<Uuid, JobCounters>,
    completion_locks: DashMap<Uuid, Arc<Mutex<bool>>>,
}

impl Default for InMemorySharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySharedState {
    pub fn new() -> Self {
        Self {
            dedup: DashMap::new(),
            queues: DashMap::new(),
            counters: DashMap::new(),
            completion_locks: DashMap::new(),
        }
    }

    fn counters_for(&self, job_id: Uuid) -> dashmap::mapref::one::RefMut<'_, Uuid, JobCounters> {
        self.counters.entry(job_id).or_default()
    }
}

#[async_trait]
impl SharedState for InMemorySharedState {
    async fn dedup_try_admit(&self, job_id: Uuid, url_hash: &str) -> bool {
        let set = self.dedup.entry(job_id).or_insert_with(DashSet::new);
        set.insert(url_hash.to_string())
    }

    async fn rehydrate_dedup(&self, job_id: Uuid, url_hashes: Vec<String>) {
        let set = self.dedup.entry(job_id).or_insert_with(DashSet::new);
        for hash in url_hashes {
            set.insert(hash);
        }
    }

    async fn dedup_count(&self, job_id: Uuid) -> usize {
        self.dedup.get(&job_id).map(|set| set.len()).unwrap_or(0)
    }

    async fn enqueue_many(&self, job_id: Uuid, tasks: Vec<Task>) {
        let queue = self.queues.entry(job_id).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut guard = queue.lock().await;
        let count = tasks.len() as u64;
        guard.extend(tasks);
        drop(guard);
        self.progress_incr(job_id, ProgressField::Queued, count).await;
    }

    async fn pop_batch(&self, job_id: Uuid, n: usize) -> Vec<Task> {
        let Some(queue) = self.queues.get(&job_id) else {
            return Vec::new();
        };
        let mut guard = queue.lock().await;
        let drained: Vec<Task> = (0..n).filter_map(|_| guard.pop_front()).collect();
        drained
    }

    async fn queue_is_empty(&self, job_id: Uuid) -> bool {
        match self.queues.get(&job_id) {
            Some(queue) => queue.lock().await.is_empty(),
            None => true,
        }
    }

    async fn progress_incr(&self, job_id: Uuid, field: ProgressField, by: u64) {
        let counters = self.counters_for(job_id);
        let atomic = match field {
            ProgressField::Discovered => &counters.discovered,
            ProgressField::Queued => &counters.queued,
            ProgressField::Processed => &counters.processed,
            ProgressField::Filtered => &counters.filtered,
            ProgressField::Skipped => &counters.skipped,
            ProgressField::Failed => &counters.failed,
        };
        atomic.fetch_add(by, Ordering::SeqCst);
    }

    async fn progress_snapshot(&self, job_id: Uuid) -> ProgressSummary {
        match self.counters.get(&job_id) {
            Some(c) => ProgressSummary {
                discovered: c.discovered.load(Ordering::SeqCst),
                queued: c.queued.load(Ordering::SeqCst),
                processed: c.processed.load(Ordering::SeqCst),
                filtered: c.filtered.load(Ordering::SeqCst),
                skipped: c.skipped.load(Ordering::SeqCst),
                failed: c.failed.load(Ordering::SeqCst),
            },
            None => ProgressSummary::default(),
        }
    }

    async fn worker_incr(&self, job_id: Uuid) -> u64 {
        self.counters_for(job_id).workers.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn worker_decr(&self, job_id: Uuid) -> u64 {
        let counters = self.counters_for(job_id);
        let prev = counters.workers.fetch_sub(1, Ordering::SeqCst);
        prev.saturating_sub(1)
    }

    async fn worker_count(&self, job_id: Uuid) -> u64 {
        match self.counters.get(&job_id) {
            Some(c) => c.workers.load(Ordering::SeqCst),
            None => 0,
        }
    }

    async fn completion_lock(&self, job_id: Uuid) -> Arc<Mutex<bool>> {
        self.completion_locks
            .entry(job_id)
            .or_insert_with(|| Arc::new(Mutex::new(false)))
            .clone()
    }

    async fn clear_job(&self, job_id: Uuid) {
        self.dedup.remove(&job_id);
        self.queues.remove(&job_id);
        self.counters.remove(&job_id);
        self.completion_locks.remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str) -> Task {
        Task {
            task_id: Uuid::new_v4(),
            url: url.to_string(),
            depth: 0,
        }
    }

    #[tokio::test]
    async fn dedup_admits_each_hash_once() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        assert!(state.dedup_try_admit(job, "abc").await);
        assert!(!state.dedup_try_admit(job, "abc").await);
        assert!(state.dedup_try_admit(job, "def").await);
    }

    #[tokio::test]
    async fn dedup_count_tracks_distinct_admissions() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        assert_eq!(state.dedup_count(job).await, 0);
        state.dedup_try_admit(job, "abc").await;
        state.dedup_try_admit(job, "abc").await;
        state.dedup_try_admit(job, "def").await;
        assert_eq!(state.dedup_count(job).await, 2);
    }

    #[tokio::test]
    async fn rehydrate_blocks_future_admission() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        state.rehydrate_dedup(job, vec!["abc".to_string()]).await;
        assert!(!state.dedup_try_admit(job, "abc").await);
    }

    #[tokio::test]
    async fn queue_pop_respects_batch_size_and_fifo_order() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        state
            .enqueue_many(job, vec![task("a"), task("b"), task("c")])
            .await;
        let batch = state.pop_batch(job, 2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].url, "a");
        assert_eq!(batch[1].url, "b");
        assert!(!state.queue_is_empty(job).await);
        let rest = state.pop_batch(job, 10).await;
        assert_eq!(rest.len(), 1);
        assert!(state.queue_is_empty(job).await);
    }

    #[tokio::test]
    async fn progress_counters_accumulate_independently() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        state.progress_incr(job, ProgressField::Processed, 3).await;
        state.progress_incr(job, ProgressField::Failed, 1).await;
        let snapshot = state.progress_snapshot(job).await;
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.discovered, 0);
    }

    #[tokio::test]
    async fn worker_counter_tracks_spawns_and_exits() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        assert_eq!(state.worker_incr(job).await, 1);
        assert_eq!(state.worker_incr(job).await, 2);
        assert_eq!(state.worker_decr(job).await, 1);
        assert_eq!(state.worker_count(job).await, 1);
    }

    #[tokio::test]
    async fn only_one_concurrent_claimant_wins_completion() {
        let state = Arc::new(InMemorySharedState::new());
        let job = Uuid::new_v4();
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let state = state.clone();
            set.spawn(async move {
                let lock = state.completion_lock(job).await;
                let mut guard = lock.lock().await;
                if *guard {
                    return false;
                }
                *guard = true;
                true
            });
        }
        let mut winners = 0;
        while let Some(res) = set.join_next().await {
            if res.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn clear_job_resets_all_state() {
        let state = InMemorySharedState::new();
        let job = Uuid::new_v4();
        state.dedup_try_admit(job, "abc").await;
        state.enqueue_many(job, vec![task("a")]).await;
        state.progress_incr(job, ProgressField::Processed, 1).await;
        state.clear_job(job).await;
        assert!(state.dedup_try_admit(job, "abc").await);
        assert!(state.queue_is_empty(job).await);
        assert_eq!(state.progress_snapshot(job).await.processed, 0);
    }
}
