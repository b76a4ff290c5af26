//! Job accounting, callback routing, and the skip registry.
//!
//! All counters, the callback side-table, and the per-job skip sets live
//! behind one supervisor lock. Multi-step transitions (a pending counter
//! draining into job finalization) run under a single acquisition, so the
//! invariants hold after every operation returns:
//!
//! - the global pending counter equals the sum of all per-id counters;
//! - the idle signal is set exactly when the global counter is zero;
//! - every id with a non-zero counter has a registered callback.
//!
//! A finished id keeps its zeroed counter entry as a done marker; the
//! callback and skip set are dropped (never-ending ids keep both).

use super::error::ClusterError;
use super::ClusterInner;
use crate::job::{Job, JobId, JobResult};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Callback invoked once per result of a logical job.
pub type ResultCallback = Box<dyn FnMut(JobResult) + Send + 'static>;

/// Content-stable digest of an action fingerprint.
///
/// Workers exchange fingerprints as strings; hashing the bytes (rather
/// than any identity) makes membership agree across workers.
type Fingerprint = [u8; 32];

fn fingerprint(action: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(action.as_bytes());
    hasher.finalize().into()
}

/// Mutable supervisor state guarded by the cluster lock.
#[derive(Default)]
pub(crate) struct ClusterState {
    /// Outstanding sub-jobs per id. A zero entry marks a finished id.
    pending: HashMap<JobId, usize>,

    /// Sum of all per-id counters.
    pending_total: usize,

    /// Result callbacks keyed by root job id.
    callbacks: HashMap<JobId, ResultCallback>,

    /// Performed-action fingerprints per id.
    skips: HashMap<JobId, HashSet<Fingerprint>>,
}

/// Snapshot of supervisor counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterStats {
    /// Outstanding sub-jobs across all ids.
    pub pending_total: usize,
    /// Ids known to the pending table (finished markers included).
    pub tracked_jobs: usize,
    /// Registered result callbacks.
    pub registered_callbacks: usize,
    /// Ids with a live skip set.
    pub live_skip_sets: usize,
    /// URLs recorded in the sitemap.
    pub sitemap_entries: usize,
}

impl ClusterInner {
    /// Registers and enqueues a job instance.
    ///
    /// `callback` is stored only the first time an id is seen; `None`
    /// requires a callback to already be registered for the id.
    pub(crate) fn submit(
        &self,
        job: Job,
        callback: Option<ResultCallback>,
    ) -> Result<(), ClusterError> {
        self.ensure_open()?;
        {
            let mut state = self.state.lock();
            let id = job.id().clone();
            if !job.is_never_ending() && state.pending.get(&id) == Some(&0) {
                return Err(ClusterError::AlreadyDone(id));
            }
            match callback {
                Some(callback) => {
                    state.callbacks.entry(id.clone()).or_insert(callback);
                }
                None => {
                    if !state.callbacks.contains_key(&id) {
                        return Err(ClusterError::MissingCallback(id));
                    }
                }
            }
            *state.pending.entry(id).or_insert(0) += 1;
            state.pending_total += 1;
            // A waiter arriving after this submit must block.
            self.idle.send_replace(false);
        }
        debug!(job_id = %job.id(), kind = job.kind(), "job queued");
        self.queue.push(job);
        Ok(())
    }

    /// Routes a result to its parent's callback.
    ///
    /// No-op when the parent id is already done. The callback runs under
    /// the supervisor lock inside a failure barrier: a panic is logged and
    /// suppressed. Callbacks must therefore not call back into the
    /// cluster; follow-up work belongs in forwarded sub-jobs.
    pub(crate) fn handle_result(&self, result: JobResult) -> Result<(), ClusterError> {
        self.ensure_open()?;
        let id = result.job.id().clone();
        let mut state = self.state.lock();
        if !result.job.is_never_ending() && state.pending.get(&id).is_none_or(|count| *count == 0)
        {
            debug!(job_id = %id, "dropping result for finished job");
            return Ok(());
        }
        if let Some(callback) = state.callbacks.get_mut(&id) {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(result))) {
                error!(job_id = %id, panic = panic_message(&*panic), "result callback panicked");
            }
        }
        Ok(())
    }

    /// Records the consumption of one job instance.
    ///
    /// Draining an id's counter to zero finalizes the job under the same
    /// lock acquisition. This is the only place the global counter is
    /// decremented (counter-drain discipline).
    pub(crate) fn decrease_pending(&self, job: &Job) {
        let mut state = self.state.lock();
        let drained = {
            let Some(count) = state.pending.get_mut(job.id()) else {
                warn!(job_id = %job.id(), "pending decrement for unknown job");
                return;
            };
            if *count == 0 {
                warn!(job_id = %job.id(), "pending decrement past zero");
                return;
            }
            *count -= 1;
            *count == 0
        };
        state.pending_total = state.pending_total.saturating_sub(1);
        if drained {
            self.finalize_job(&mut state, job);
        }
    }

    /// Completes a logical job. Called with the state lock held.
    ///
    /// For never-ending jobs the callback and skip set survive and the
    /// pending counter is free to rise above zero again.
    fn finalize_job(&self, state: &mut ClusterState, job: &Job) {
        debug_assert_eq!(state.pending.get(job.id()).copied().unwrap_or(0), 0);
        if !job.is_never_ending() {
            state.callbacks.remove(job.id());
            state.skips.remove(job.id());
            debug!(job_id = %job.id(), "job done");
        }
        if state.pending_total == 0 {
            debug!("cluster idle");
            self.idle.send_replace(true);
        }
    }

    /// Returns whether the job's id has completed.
    pub(crate) fn is_job_done(
        &self,
        job: &Job,
        fail_if_missing: bool,
    ) -> Result<bool, ClusterError> {
        self.ensure_open()?;
        if job.is_never_ending() {
            return Ok(false);
        }
        let state = self.state.lock();
        let known =
            state.pending.contains_key(job.id()) || state.callbacks.contains_key(job.id());
        if !known && fail_if_missing {
            return Err(ClusterError::JobNotFound(job.id().clone()));
        }
        Ok(state.pending.get(job.id()).is_none_or(|count| *count == 0))
    }

    /// Worker-side guard: a popped instance whose id already finalized is
    /// discarded without execution.
    pub(crate) fn is_stale(&self, job: &Job) -> bool {
        if job.is_never_ending() {
            return false;
        }
        let state = self.state.lock();
        state.pending.get(job.id()).is_none_or(|count| *count == 0)
    }

    /// Membership test for an action fingerprint.
    pub(crate) fn is_skipped(&self, id: &JobId, action: &str) -> bool {
        let state = self.state.lock();
        state
            .skips
            .get(id)
            .is_some_and(|set| set.contains(&fingerprint(action)))
    }

    /// Inserts an action fingerprint; returns true if it was newly
    /// inserted, i.e. the caller claimed the action.
    pub(crate) fn mark_skipped(&self, id: &JobId, action: &str) -> bool {
        let mut state = self.state.lock();
        state
            .skips
            .entry(id.clone())
            .or_default()
            .insert(fingerprint(action))
    }

    /// Unions a batch of fingerprints into the id's skip set.
    pub(crate) fn merge_skips<I, S>(&self, id: &JobId, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        let set = state.skips.entry(id.clone()).or_default();
        set.extend(actions.into_iter().map(|action| fingerprint(action.as_ref())));
    }

    /// Snapshot of supervisor counters.
    pub(crate) fn stats(&self) -> ClusterStats {
        let state = self.state.lock();
        ClusterStats {
            pending_total: state.pending_total,
            tracked_jobs: state.pending.len(),
            registered_callbacks: state.callbacks.len(),
            live_skip_sets: state.skips.len(),
            sitemap_entries: self.sitemap.len(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
