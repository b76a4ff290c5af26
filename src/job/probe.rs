//! Data-driven probe job.
//!
//! A probe executes a small scripted sequence: optionally visit a URL,
//! optionally claim an action fingerprint in the skip registry (aborting
//! if another instance already performed it), report canned payloads, and
//! forward child probes under the same id. The scheduler's test suite is
//! built on probes; they exercise every fan-out, dedup, and accounting
//! edge without a real site.

use super::{ExecStats, Job, JobError, JobPayload};
use crate::browser::Browser;
use crate::cluster::BrowserCluster;
use crate::job::JobResult;
use serde::{Deserialize, Serialize};

/// Scripted behavior of a probe instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// URL to load before anything else.
    pub visit: Option<String>,

    /// Action fingerprint to claim; the probe aborts when another
    /// instance of the same job already claimed it.
    pub action: Option<String>,

    /// Payloads to report to the callback, in order.
    pub emit: Vec<serde_json::Value>,

    /// Child probes forwarded under the same job id.
    pub spawn: Vec<ProbeSpec>,
}

impl ProbeSpec {
    /// Creates an empty probe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL to visit (builder pattern).
    pub fn visit(mut self, url: impl Into<String>) -> Self {
        self.visit = Some(url.into());
        self
    }

    /// Sets the guarded action fingerprint (builder pattern).
    pub fn action(mut self, fingerprint: impl Into<String>) -> Self {
        self.action = Some(fingerprint.into());
        self
    }

    /// Adds a payload to report (builder pattern).
    pub fn emit(mut self, payload: impl Into<serde_json::Value>) -> Self {
        self.emit.push(payload.into());
        self
    }

    /// Adds a child probe (builder pattern).
    pub fn spawn(mut self, child: ProbeSpec) -> Self {
        self.spawn.push(child);
        self
    }
}

pub(super) async fn run(
    job: &Job,
    spec: &ProbeSpec,
    browser: &mut dyn Browser,
    cluster: &BrowserCluster,
) -> Result<ExecStats, JobError> {
    let mut stats = ExecStats::default();

    if let Some(url) = &spec.visit {
        let code = browser.load(url).await?;
        stats.pages_loaded += 1;
        cluster.push_to_sitemap(url, code)?;
    }

    if let Some(action) = &spec.action {
        if !cluster.mark_skipped(job.id(), action)? {
            return Ok(stats);
        }
    }

    for payload in &spec.emit {
        cluster.handle_result(JobResult::new(job.clone(), payload.clone()))?;
    }

    for child in &spec.spawn {
        cluster.requeue(job.forward(JobPayload::Probe(child.clone())))?;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::stub::{StubLauncher, StubSite};
    use crate::browser::BrowserLauncher;
    use crate::cluster::{BrowserCluster, ClusterConfig};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn workerless_cluster() -> BrowserCluster {
        BrowserCluster::new(
            ClusterConfig::default().with_pool_size(0),
            Arc::new(StubLauncher::new(StubSite::new())),
        )
    }

    #[tokio::test]
    async fn test_probe_emits_and_spawns() {
        let launcher = StubLauncher::new(StubSite::new());
        let cluster = workerless_cluster();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let job = Job::probe(
            ProbeSpec::new()
                .emit(json!("first"))
                .emit(json!("second"))
                .spawn(ProbeSpec::new().emit(json!("child"))),
        );
        cluster
            .queue(job.clone(), move |result: JobResult| {
                sink.lock().unwrap().push(result.payload)
            })
            .unwrap();
        let before = cluster.stats().pending_total;

        let mut browser = launcher.launch(cluster.js_token()).await.unwrap();
        job.execute(browser.as_mut(), &cluster).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!("first"), json!("second")]);
        assert_eq!(cluster.stats().pending_total, before + 1);
    }

    #[tokio::test]
    async fn test_probe_aborts_when_action_already_claimed() {
        let launcher = StubLauncher::new(StubSite::new());
        let cluster = workerless_cluster();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let job = Job::probe(ProbeSpec::new().action("click#btn").emit(json!("ran")));
        cluster
            .queue(job.clone(), move |result: JobResult| {
                sink.lock().unwrap().push(result.payload)
            })
            .unwrap();

        let mut browser = launcher.launch(cluster.js_token()).await.unwrap();
        job.execute(browser.as_mut(), &cluster).await.unwrap();
        job.execute(browser.as_mut(), &cluster).await.unwrap();

        // Second run found the fingerprint claimed and aborted.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_visit_populates_sitemap() {
        let site = StubSite::new().page(crate::browser::Page::new("https://site.test/", 200));
        let launcher = StubLauncher::new(site);
        let cluster = workerless_cluster();

        let job = Job::probe(ProbeSpec::new().visit("https://site.test/"));
        cluster.queue(job.clone(), |_| {}).unwrap();

        let mut browser = launcher.launch(cluster.js_token()).await.unwrap();
        let stats = job.execute(browser.as_mut(), &cluster).await.unwrap();

        assert_eq!(stats.pages_loaded, 1);
        assert_eq!(cluster.sitemap().get("https://site.test/"), Some(&200));
    }
}
