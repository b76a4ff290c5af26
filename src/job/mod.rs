//! Job and result model.
//!
//! A job is a serializable unit of browser-side work with a stable
//! [`JobId`]. Jobs may produce children sharing their id via
//! [`Job::forward`]; the cluster's accounting treats all instances of an id
//! as one logical job. Because the queue spills jobs to disk, payloads are
//! data only; result callbacks never travel with a job and are instead
//! routed through the supervisor's side-table keyed by id.
//!
//! # Job kinds
//!
//! - [`JobPayload::Exploration`]: drive a resource's DOM transitions.
//! - [`JobPayload::TaintTrace`]: fire events with a taint value and report
//!   pages that reflect it.
//! - [`JobPayload::BrowserProvider`]: hand the assigned worker's browser
//!   state to the registered callback.
//! - [`JobPayload::Probe`]: data-driven synthetic job used by the test
//!   suite to exercise scheduler edges.

mod explore;
mod probe;
mod provider;
mod taint;

pub use explore::{ExploreOptions, DEFAULT_EXPLORE_DEPTH};
pub use probe::ProbeSpec;
pub use taint::TaintOptions;

use crate::browser::{Browser, BrowserError};
use crate::cluster::{BrowserCluster, ClusterError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of a logical job across all of its forwarded instances.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID with the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated job ID (`job-N`).
    pub fn auto() -> Self {
        let counter = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("job-{}", counter))
    }

    /// Returns the string value of this job ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Descriptor of the resource a job operates on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// URL of the resource.
    pub url: String,
}

impl Resource {
    /// Creates a resource descriptor.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Kind-specific job parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Explore a resource's event-driven DOM transitions.
    Exploration {
        resource: Resource,
        options: ExploreOptions,
    },

    /// Trace a taint value through a resource's inputs.
    TaintTrace {
        resource: Resource,
        options: TaintOptions,
    },

    /// Hand the assigned worker's browser state to the callback.
    BrowserProvider,

    /// Data-driven synthetic job for exercising the scheduler.
    Probe(ProbeSpec),
}

/// A unit of browser-side work.
///
/// Identity equality and hashing are by [`JobId`] only: a forwarded child
/// compares equal to its parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    never_ending: bool,
    payload: JobPayload,
}

impl Job {
    /// Creates a job with an auto-generated id.
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: JobId::auto(),
            never_ending: false,
            payload,
        }
    }

    /// Creates an exploration job.
    pub fn exploration(resource: Resource, options: ExploreOptions) -> Self {
        Self::new(JobPayload::Exploration { resource, options })
    }

    /// Creates a taint-trace job.
    pub fn taint_trace(resource: Resource, options: TaintOptions) -> Self {
        Self::new(JobPayload::TaintTrace { resource, options })
    }

    /// Creates a single-shot browser-provider job.
    pub fn browser_provider() -> Self {
        Self::new(JobPayload::BrowserProvider)
    }

    /// Creates a probe job.
    pub fn probe(spec: ProbeSpec) -> Self {
        Self::new(JobPayload::Probe(spec))
    }

    /// Marks this job as never-ending (builder pattern).
    ///
    /// A never-ending job's callback is retained indefinitely and its
    /// pending counter may return above zero after reaching it; it is
    /// never reported as done.
    pub fn with_never_ending(mut self, never_ending: bool) -> Self {
        self.never_ending = never_ending;
        self
    }

    /// Returns the job's id.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Returns true if this job is never-ending.
    pub fn is_never_ending(&self) -> bool {
        self.never_ending
    }

    /// Returns the payload.
    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Returns the kind tag for logging.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            JobPayload::Exploration { .. } => "exploration",
            JobPayload::TaintTrace { .. } => "taint_trace",
            JobPayload::BrowserProvider => "browser_provider",
            JobPayload::Probe(_) => "probe",
        }
    }

    /// Produces a child job carrying `payload` under this job's id.
    ///
    /// The forwarder is how one job fans out into sub-jobs: results of the
    /// child are routed to the parent's callback, and the parent is not
    /// done until every forwarded instance has been consumed.
    pub fn forward(&self, payload: JobPayload) -> Job {
        Job {
            id: self.id.clone(),
            never_ending: self.never_ending,
            payload,
        }
    }

    /// Executes this job instance against a worker's browser.
    ///
    /// The `cluster` handle lets the job report results, forward
    /// sub-jobs, consult the skip registry, and append to the sitemap.
    pub async fn execute(
        &self,
        browser: &mut dyn Browser,
        cluster: &BrowserCluster,
    ) -> Result<ExecStats, JobError> {
        match &self.payload {
            JobPayload::Exploration { resource, options } => {
                explore::run(self, resource, options, browser, cluster).await
            }
            JobPayload::TaintTrace { resource, options } => {
                taint::run(self, resource, options, browser, cluster).await
            }
            JobPayload::BrowserProvider => provider::run(self, browser, cluster).await,
            JobPayload::Probe(spec) => probe::run(self, spec, browser, cluster).await,
        }
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Result envelope routed to the parent job's callback.
#[derive(Clone, Debug)]
pub struct JobResult {
    /// The specific job instance that produced this result.
    pub job: Job,
    /// Kind-specific result data.
    pub payload: serde_json::Value,
}

impl JobResult {
    /// Creates a result envelope.
    pub fn new(job: Job, payload: serde_json::Value) -> Self {
        Self { job, payload }
    }
}

/// Per-execution statistics reported back to the worker.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecStats {
    /// Pages the browser loaded while executing this instance. Counts
    /// toward the owning browser's time-to-live.
    pub pages_loaded: usize,
}

/// Errors raised while executing a job instance.
///
/// These never cross the worker boundary: the worker logs them, keeps
/// accounting consistent, and moves on.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The browser failed underneath the job
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// A supervisor call was rejected (typically mid-shutdown)
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// A result payload could not be encoded
    #[error("result encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl JobError {
    /// Returns true if the underlying browser must be recycled.
    pub fn requires_recycle(&self) -> bool {
        matches!(self, Self::Browser(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_auto_is_unique() {
        let a = JobId::auto();
        let b = JobId::auto();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("job-"));
    }

    #[test]
    fn test_forward_shares_identity() {
        let parent = Job::exploration(
            Resource::new("https://example.com/"),
            ExploreOptions::default(),
        );
        let child = parent.forward(JobPayload::Exploration {
            resource: Resource::new("https://example.com/next"),
            options: ExploreOptions::default(),
        });

        assert_eq!(parent.id(), child.id());
        assert_eq!(parent, child);
    }

    #[test]
    fn test_forward_preserves_never_ending() {
        let parent = Job::browser_provider().with_never_ending(true);
        let child = parent.forward(JobPayload::BrowserProvider);
        assert!(child.is_never_ending());
    }

    #[test]
    fn test_equality_is_by_id_only() {
        let a = Job::probe(ProbeSpec::default());
        let b = a.forward(JobPayload::BrowserProvider);
        assert_eq!(a, b);

        let c = Job::probe(ProbeSpec::default());
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(Job::browser_provider().kind(), "browser_provider");
        assert_eq!(Job::probe(ProbeSpec::default()).kind(), "probe");
        assert_eq!(
            Job::taint_trace(Resource::new("u"), TaintOptions::new("t")).kind(),
            "taint_trace"
        );
    }

    #[test]
    fn test_job_survives_spill_round_trip() {
        let job = Job::exploration(
            Resource::new("https://example.com/login"),
            ExploreOptions::default().with_depth(3),
        );
        let bytes = serde_json::to_vec(&job).unwrap();
        let back: Job = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(back.id(), job.id());
        assert_eq!(back.kind(), "exploration");
        match back.payload() {
            JobPayload::Exploration { resource, options } => {
                assert_eq!(resource.url, "https://example.com/login");
                assert_eq!(options.depth, 3);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
