//! Disk-spilling FIFO job queue.
//!
//! The queue keeps up to `resident_limit` jobs in a memory deque; anything
//! beyond that is serialized to a uniquely numbered file in a private
//! temporary directory and re-materialized lazily on pop. Once an item has
//! spilled, later pushes spill too until the overflow drains, keeping
//! global FIFO order intact across the memory/disk boundary.
//!
//! `push` never blocks and never drops: when spilling fails (disk full,
//! serialization error) the job stays resident and the failure is logged.
//! `pop` suspends until an item is available.

use crate::job::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// FIFO queue of jobs with bounded resident memory.
pub(crate) struct JobQueue {
    inner: Mutex<QueueInner>,
    available: Notify,
}

struct QueueInner {
    resident: VecDeque<Job>,
    spilled: VecDeque<PathBuf>,
    spill_dir: Option<TempDir>,
    resident_limit: usize,
    spill_seq: u64,
}

impl JobQueue {
    /// Creates an empty queue keeping at most `resident_limit` jobs in
    /// memory. The spill directory is created lazily on first overflow.
    pub(crate) fn new(resident_limit: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                resident: VecDeque::new(),
                spilled: VecDeque::new(),
                spill_dir: None,
                resident_limit,
                spill_seq: 0,
            }),
            available: Notify::new(),
        }
    }

    /// Appends a job. Never blocks, never drops.
    pub(crate) fn push(&self, job: Job) {
        {
            let mut inner = self.inner.lock();
            if inner.resident.len() >= inner.resident_limit || !inner.spilled.is_empty() {
                match inner.spill(&job) {
                    Ok(path) => inner.spilled.push_back(path),
                    Err(error) => {
                        warn!(job_id = %job.id(), %error, "spill failed, keeping job resident");
                        inner.resident.push_back(job);
                    }
                }
            } else {
                inner.resident.push_back(job);
            }
        }
        self.available.notify_one();
    }

    /// Removes and returns the oldest job, suspending until one exists.
    pub(crate) async fn pop(&self) -> Job {
        loop {
            if let Some(job) = self.try_pop() {
                return job;
            }
            self.available.notified().await;
        }
    }

    /// Non-blocking pop.
    pub(crate) fn try_pop(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        let job = inner.take_front();
        let more = !inner.resident.is_empty() || !inner.spilled.is_empty();
        drop(inner);
        if job.is_some() && more {
            // Pass the wakeup along so sibling consumers stay live.
            self.available.notify_one();
        }
        job
    }

    /// Discards every queued job, in memory and on disk.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.resident.len() + inner.spilled.len();
        inner.resident.clear();
        for path in inner.spilled.drain(..) {
            if let Err(error) = fs::remove_file(&path) {
                debug!(path = %path.display(), %error, "failed to remove spill file");
            }
        }
        if dropped > 0 {
            debug!(dropped, "queue cleared");
        }
    }

    /// Number of queued jobs across both tiers.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.resident.len() + inner.spilled.len()
    }

    /// Number of jobs currently spilled to disk.
    #[cfg(test)]
    pub(crate) fn spilled_len(&self) -> usize {
        self.inner.lock().spilled.len()
    }
}

impl QueueInner {
    /// Writes `job` to a fresh spill file and returns its path.
    fn spill(&mut self, job: &Job) -> std::io::Result<PathBuf> {
        let bytes = serde_json::to_vec(job).map_err(std::io::Error::other)?;
        if self.spill_dir.is_none() {
            let dir = TempDir::with_prefix("domflock-queue-")?;
            debug!(dir = %dir.path().display(), "created queue spill directory");
            self.spill_dir = Some(dir);
        }
        let Some(dir) = self.spill_dir.as_ref() else {
            return Err(std::io::Error::other("spill directory unavailable"));
        };
        let path = dir.path().join(format!("job-{:08}.json", self.spill_seq));
        self.spill_seq += 1;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Takes the oldest job: resident tier first, then the spill tier.
    fn take_front(&mut self) -> Option<Job> {
        if let Some(job) = self.resident.pop_front() {
            return Some(job);
        }
        while let Some(path) = self.spilled.pop_front() {
            match Self::restore(&path) {
                Ok(job) => return Some(job),
                Err(error) => {
                    // A corrupt spill file loses one item; log it loudly.
                    warn!(path = %path.display(), %error, "discarding unreadable spill file");
                }
            }
        }
        None
    }

    fn restore(path: &PathBuf) -> std::io::Result<Job> {
        let bytes = fs::read(path)?;
        let job = serde_json::from_slice(&bytes).map_err(std::io::Error::other)?;
        let _ = fs::remove_file(path);
        Ok(job)
    }
}
