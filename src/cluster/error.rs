//! Error types for cluster operations.
//!
//! All variants are caller contract violations raised synchronously; the
//! cluster's state stays consistent when they fire. Browser-side failures
//! never surface here; workers isolate those.

use crate::job::JobId;
use thiserror::Error;

/// Errors raised by the cluster supervisor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// The cluster has been shut down; only `shutdown` itself remains
    /// callable
    #[error("cluster already shut down")]
    AlreadyShutdown,

    /// The job's id is known and its pending counter already drained
    #[error("job {0} has already completed")]
    AlreadyDone(JobId),

    /// The job's id is unknown to both counters and callbacks
    #[error("job {0} is not known to the cluster")]
    JobNotFound(JobId),

    /// No callback was ever registered for the job's id
    #[error("no callback registered for job {0}")]
    MissingCallback(JobId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", ClusterError::AlreadyShutdown),
            "cluster already shut down"
        );
        assert_eq!(
            format!("{}", ClusterError::AlreadyDone(JobId::new("j1"))),
            "job j1 has already completed"
        );
        assert_eq!(
            format!("{}", ClusterError::MissingCallback(JobId::new("j2"))),
            "no callback registered for job j2"
        );
    }
}
