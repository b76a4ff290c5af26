//! Cluster supervisor.
//!
//! [`BrowserCluster`] is the public facade over the scheduler: it owns the
//! persistent job queue, the accounting state, the skip registry, the
//! sitemap, and the worker pool. Callers submit jobs with a result
//! callback; workers pop jobs, execute them against their browser, and
//! fan results back through the registered callback until every instance
//! of a job id has been consumed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BrowserCluster                          │
//! │  queue / requeue / explore / trace_taint / with_browser      │
//! │  wait / shutdown / skip registry / sitemap                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ JobQueue    │  │ ClusterState │  │ Worker × pool_size │  │
//! │  │ (disk spill)│  │ (accounting) │  │ (one browser each) │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All shared mutable state sits behind one supervisor lock; workers take
//! it only for brief accounting calls, never across browser I/O.

mod accounting;
mod config;
mod error;
mod queue;
mod worker;

pub use accounting::{ClusterStats, ResultCallback};
pub use config::{
    ClusterConfig, DEFAULT_POOL_SIZE, DEFAULT_RESIDENT_JOBS, DEFAULT_TIME_TO_LIVE,
};
pub use error::ClusterError;

use crate::browser::BrowserLauncher;
use crate::job::{ExploreOptions, Job, JobId, JobResult, Resource, TaintOptions};
use accounting::ClusterState;
use dashmap::DashMap;
use parking_lot::Mutex;
use queue::JobQueue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;
use worker::Worker;

/// Shared core owned by the facade and referenced by every worker.
///
/// The supervisor outlives its workers by construction: workers hold a
/// facade clone, and `shutdown` joins them before the facade lets go.
pub(crate) struct ClusterInner {
    /// Persistent FIFO feeding the worker pool.
    pub(crate) queue: JobQueue,

    /// Accounting state behind the supervisor lock.
    pub(crate) state: Mutex<ClusterState>,

    /// Process-wide URL → HTTP status map, last writer wins.
    pub(crate) sitemap: DashMap<String, u16>,

    /// Idle signal: true exactly while the global pending counter is zero.
    pub(crate) idle: watch::Sender<bool>,

    /// Shutdown flag shared with every worker.
    pub(crate) shutdown: CancellationToken,

    /// Worker task handles, drained by `shutdown`.
    pub(crate) workers: Mutex<Vec<JoinHandle<()>>>,

    /// Random namespace for browser-injected DOM state.
    pub(crate) js_token: String,
}

impl ClusterInner {
    pub(crate) fn ensure_open(&self) -> Result<(), ClusterError> {
        if self.shutdown.is_cancelled() {
            Err(ClusterError::AlreadyShutdown)
        } else {
            Ok(())
        }
    }
}

impl Drop for ClusterInner {
    fn drop(&mut self) {
        // Orphaned worker tasks must not outlive the supervisor.
        self.shutdown.cancel();
    }
}

/// A bounded pool of browser workers executing jobs from a shared queue.
///
/// Cheap to clone; all clones drive the same cluster. Construction spawns
/// the worker tasks, so it must happen inside a tokio runtime whenever
/// `pool_size > 0`.
#[derive(Clone)]
pub struct BrowserCluster {
    inner: Arc<ClusterInner>,
}

impl BrowserCluster {
    /// Creates a cluster and starts its worker pool.
    pub fn new(config: ClusterConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let cluster = Self {
            inner: Arc::new(ClusterInner {
                queue: JobQueue::new(config.resident_jobs),
                state: Mutex::new(ClusterState::default()),
                sitemap: DashMap::new(),
                idle: watch::Sender::new(true),
                shutdown: CancellationToken::new(),
                workers: Mutex::new(Vec::new()),
                js_token: Uuid::new_v4().simple().to_string(),
            }),
        };

        let handles: Vec<JoinHandle<()>> = (0..config.pool_size)
            .map(|slot| {
                let worker = Worker::new(
                    slot,
                    cluster.clone(),
                    Arc::clone(&launcher),
                    config.time_to_live,
                );
                tokio::spawn(worker.run())
            })
            .collect();
        *cluster.inner.workers.lock() = handles;

        info!(
            pool_size = config.pool_size,
            time_to_live = config.time_to_live,
            "browser cluster started"
        );
        cluster
    }

    /// Submits a job and registers its result callback.
    ///
    /// The callback is stored the first time the job's id is seen and
    /// invoked once per result produced by any instance of the id. It runs
    /// under the supervisor lock: it must not call back into the cluster;
    /// follow-up work belongs in forwarded sub-jobs.
    ///
    /// # Errors
    ///
    /// [`ClusterError::AlreadyShutdown`] after shutdown;
    /// [`ClusterError::AlreadyDone`] when the id is known and finished.
    pub fn queue<C>(&self, job: Job, callback: C) -> Result<(), ClusterError>
    where
        C: FnMut(JobResult) + Send + 'static,
    {
        self.inner.submit(job, Some(Box::new(callback)))
    }

    /// Queues a further instance of an already-registered job id: a
    /// forwarded child, or a repeated submission of a never-ending job.
    ///
    /// # Errors
    ///
    /// As [`queue`](Self::queue), plus [`ClusterError::MissingCallback`]
    /// when no callback was ever registered for the id.
    pub fn requeue(&self, job: Job) -> Result<(), ClusterError> {
        self.inner.submit(job, None)
    }

    /// Queues a DOM exploration of `resource`; returns the queued job.
    pub fn explore<C>(
        &self,
        resource: Resource,
        options: ExploreOptions,
        callback: C,
    ) -> Result<Job, ClusterError>
    where
        C: FnMut(JobResult) + Send + 'static,
    {
        let job = Job::exploration(resource, options);
        self.inner.submit(job.clone(), Some(Box::new(callback)))?;
        Ok(job)
    }

    /// Queues a taint trace of `resource`; returns the queued job.
    pub fn trace_taint<C>(
        &self,
        resource: Resource,
        options: TaintOptions,
        callback: C,
    ) -> Result<Job, ClusterError>
    where
        C: FnMut(JobResult) + Send + 'static,
    {
        let job = Job::taint_trace(resource, options);
        self.inner.submit(job.clone(), Some(Box::new(callback)))?;
        Ok(job)
    }

    /// Hands a free worker's browser state to `callback` via a
    /// single-shot [`Job::browser_provider`] job; returns the queued job.
    pub fn with_browser<C>(&self, callback: C) -> Result<Job, ClusterError>
    where
        C: FnMut(JobResult) + Send + 'static,
    {
        let job = Job::browser_provider();
        self.inner.submit(job.clone(), Some(Box::new(callback)))?;
        Ok(job)
    }

    /// Routes a result produced during job execution to the registered
    /// callback. No-op when the result's parent job is already done.
    pub fn handle_result(&self, result: JobResult) -> Result<(), ClusterError> {
        self.inner.handle_result(result)
    }

    /// Returns whether `action` was already performed for the job id.
    pub fn is_skipped(&self, id: &JobId, action: &str) -> Result<bool, ClusterError> {
        self.inner.ensure_open()?;
        Ok(self.inner.is_skipped(id, action))
    }

    /// Claims `action` for the job id. Returns true when this caller won
    /// the claim; false when some worker already performed the action.
    pub fn mark_skipped(&self, id: &JobId, action: &str) -> Result<bool, ClusterError> {
        self.inner.ensure_open()?;
        Ok(self.inner.mark_skipped(id, action))
    }

    /// Unions a batch of action fingerprints into the id's skip set.
    pub fn merge_skips<I, S>(&self, id: &JobId, actions: I) -> Result<(), ClusterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.ensure_open()?;
        self.inner.merge_skips(id, actions);
        Ok(())
    }

    /// Records the HTTP status observed for `url`.
    pub fn push_to_sitemap(&self, url: &str, code: u16) -> Result<(), ClusterError> {
        self.inner.ensure_open()?;
        self.inner.sitemap.insert(url.to_string(), code);
        Ok(())
    }

    /// Snapshot of the URL → HTTP status sitemap.
    pub fn sitemap(&self) -> HashMap<String, u16> {
        self.inner
            .sitemap
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// The cluster-wide JS namespace token shared with every browser.
    pub fn js_token(&self) -> &str {
        &self.inner.js_token
    }

    /// Snapshot of supervisor counters.
    pub fn stats(&self) -> ClusterStats {
        self.inner.stats()
    }

    /// Returns whether the job's id has completed.
    ///
    /// Never-ending jobs are never done. With `fail_if_missing`, an id
    /// unknown to both counters and callbacks raises
    /// [`ClusterError::JobNotFound`].
    pub fn is_job_done(&self, job: &Job, fail_if_missing: bool) -> Result<bool, ClusterError> {
        self.inner.is_job_done(job, fail_if_missing)
    }

    /// Returns whether the cluster is idle (no outstanding sub-jobs).
    pub fn is_done(&self) -> Result<bool, ClusterError> {
        self.inner.ensure_open()?;
        Ok(*self.inner.idle.borrow())
    }

    /// Suspends until the cluster is idle.
    ///
    /// Returns immediately on a fresh or drained cluster. Fails with
    /// [`ClusterError::AlreadyShutdown`] when the cluster shuts down
    /// before (or while) waiting.
    pub async fn wait(&self) -> Result<(), ClusterError> {
        let mut idle = self.inner.idle.subscribe();
        loop {
            self.inner.ensure_open()?;
            if *idle.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return Err(ClusterError::AlreadyShutdown),
                changed = idle.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Shuts the cluster down: drops every queued job (memory and disk),
    /// terminates every worker and its browser, releases waiters.
    ///
    /// Idempotent. Afterwards every public scheduling operation fails
    /// with [`ClusterError::AlreadyShutdown`] and pending callbacks are
    /// never invoked.
    pub async fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("cluster shutting down");
            self.inner.shutdown.cancel();
        }
        self.inner.queue.clear();

        let handles: Vec<JoinHandle<()>> = self.inner.workers.lock().drain(..).collect();
        for handle in handles {
            if let Err(error) = handle.await {
                debug!(%error, "worker task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for BrowserCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("BrowserCluster")
            .field("pending_total", &stats.pending_total)
            .field("tracked_jobs", &stats.tracked_jobs)
            .field("shutdown", &self.inner.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
