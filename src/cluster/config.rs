//! Cluster configuration.

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default number of browser workers in the pool.
pub const DEFAULT_POOL_SIZE: usize = 6;

/// Default number of pages a browser serves before it is recycled.
pub const DEFAULT_TIME_TO_LIVE: usize = 10;

/// Default number of queued jobs kept resident in memory before the queue
/// spills to disk.
pub const DEFAULT_RESIDENT_JOBS: usize = 100;

// =============================================================================
// Cluster Configuration
// =============================================================================

/// Configuration for a [`BrowserCluster`](super::BrowserCluster).
///
/// Set once at construction; the cluster reads no environment variables
/// and persists no state across process restarts.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Number of browser workers.
    pub pool_size: usize,

    /// Pages a browser may serve before its worker recycles it. Bounds
    /// memory leakage from long-lived browser processes.
    pub time_to_live: usize,

    /// Queued jobs kept resident in memory; the excess spills to disk.
    pub resident_jobs: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            resident_jobs: DEFAULT_RESIDENT_JOBS,
        }
    }
}

impl ClusterConfig {
    /// Sets the worker count (builder pattern).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the browser time-to-live in pages (builder pattern).
    pub fn with_time_to_live(mut self, time_to_live: usize) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// Sets the resident queue threshold (builder pattern).
    pub fn with_resident_jobs(mut self, resident_jobs: usize) -> Self {
        self.resident_jobs = resident_jobs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.time_to_live, DEFAULT_TIME_TO_LIVE);
        assert_eq!(config.resident_jobs, DEFAULT_RESIDENT_JOBS);
    }

    #[test]
    fn test_config_builders() {
        let config = ClusterConfig::default()
            .with_pool_size(2)
            .with_time_to_live(3)
            .with_resident_jobs(8);
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.time_to_live, 3);
        assert_eq!(config.resident_jobs, 8);
    }
}
