//! Browser worker.
//!
//! Each worker owns one browser and loops: pop a job, execute it against
//! the browser, report consumption to the supervisor. Workers hold the
//! supervisor lock only for accounting calls, never across browser I/O.
//! After `time_to_live` pages the browser is torn down and relaunched,
//! bounding memory leakage from long-lived browser processes; a fatal
//! browser error forces the same recycle immediately.

use super::BrowserCluster;
use crate::browser::{Browser, BrowserLauncher};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between browser launch attempts.
const LAUNCH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A single pool slot.
pub(crate) struct Worker {
    slot: usize,
    cluster: BrowserCluster,
    launcher: Arc<dyn BrowserLauncher>,
    time_to_live: usize,
}

impl Worker {
    pub(crate) fn new(
        slot: usize,
        cluster: BrowserCluster,
        launcher: Arc<dyn BrowserLauncher>,
        time_to_live: usize,
    ) -> Self {
        Self {
            slot,
            cluster,
            launcher,
            time_to_live,
        }
    }

    /// Runs the worker until the cluster shuts down.
    pub(crate) async fn run(self) {
        let shutdown = self.cluster.inner.shutdown.clone();
        let Some(mut browser) = self.launch_browser(&shutdown).await else {
            return;
        };
        let mut pages_served = 0usize;

        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = self.cluster.inner.queue.pop() => job,
            };

            if self.cluster.inner.is_stale(&job) {
                debug!(slot = self.slot, job_id = %job.id(), "skipping finished job");
                continue;
            }

            debug!(slot = self.slot, job_id = %job.id(), kind = job.kind(), "job started");
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                outcome = job.execute(browser.as_mut(), &self.cluster) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                // Coarse shutdown kills the in-flight job with the browser.
                break;
            };

            let mut recycle_now = false;
            match outcome {
                Ok(stats) => {
                    pages_served += stats.pages_loaded;
                    debug!(
                        slot = self.slot,
                        job_id = %job.id(),
                        pages_served,
                        "job finished"
                    );
                }
                Err(error) => {
                    warn!(slot = self.slot, job_id = %job.id(), %error, "job execution failed");
                    recycle_now = error.requires_recycle();
                }
            }
            self.cluster.inner.decrease_pending(&job);

            if recycle_now || (self.time_to_live > 0 && pages_served >= self.time_to_live) {
                info!(slot = self.slot, pages_served, "recycling browser");
                browser.shutdown().await;
                match self.launch_browser(&shutdown).await {
                    Some(fresh) => {
                        browser = fresh;
                        pages_served = 0;
                    }
                    // Shutdown raced the relaunch; the old browser is gone.
                    None => return,
                }
            }
        }

        browser.shutdown().await;
        debug!(slot = self.slot, "worker stopped");
    }

    /// Launches a browser, retrying until it succeeds or the cluster
    /// shuts down.
    async fn launch_browser(&self, shutdown: &CancellationToken) -> Option<Box<dyn Browser>> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            match self.launcher.launch(self.cluster.js_token()).await {
                Ok(browser) => {
                    debug!(slot = self.slot, "browser ready");
                    return Some(browser);
                }
                Err(error) => {
                    warn!(slot = self.slot, %error, "browser launch failed, retrying");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(LAUNCH_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::stub::{StubLauncher, StubSite};
    use crate::browser::BrowserError;
    use crate::cluster::ClusterConfig;
    use async_trait::async_trait;

    struct FailingLauncher;

    #[async_trait]
    impl BrowserLauncher for FailingLauncher {
        async fn launch(&self, _js_token: &str) -> Result<Box<dyn Browser>, BrowserError> {
            Err(BrowserError::Spawn("no browser binary".into()))
        }
    }

    fn workerless_cluster() -> BrowserCluster {
        BrowserCluster::new(
            ClusterConfig::default().with_pool_size(0),
            Arc::new(StubLauncher::new(StubSite::new())),
        )
    }

    #[tokio::test]
    async fn test_worker_exits_when_shutdown_preempts_launch() {
        let cluster = workerless_cluster();
        let worker = Worker::new(0, cluster.clone(), Arc::new(FailingLauncher), 10);

        cluster.inner.shutdown.cancel();
        tokio::time::timeout(Duration::from_millis(200), worker.run())
            .await
            .expect("worker should exit promptly");
    }

    #[tokio::test]
    async fn test_worker_retries_launch_until_shutdown() {
        let cluster = workerless_cluster();
        let worker = Worker::new(0, cluster.clone(), Arc::new(FailingLauncher), 10);

        let handle = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        cluster.inner.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should exit after shutdown")
            .unwrap();
    }
}
