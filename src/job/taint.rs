//! Taint-trace job.
//!
//! Fires every transition of a resource with a taint value as the input
//! and reports the pages whose rendered body reflects it. Sightings are
//! what the embedding auditor turns into injection findings; pages that do
//! not reflect the taint produce no result at all.

use super::{ExecStats, Job, JobError, Resource};
use crate::browser::Browser;
use crate::cluster::BrowserCluster;
use crate::job::JobResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Parameters for a taint-trace job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintOptions {
    /// Value injected into every fired input.
    pub taint: String,
}

impl TaintOptions {
    /// Creates options carrying the given taint value.
    pub fn new(taint: impl Into<String>) -> Self {
        Self {
            taint: taint.into(),
        }
    }
}

pub(super) async fn run(
    job: &Job,
    resource: &Resource,
    options: &TaintOptions,
    browser: &mut dyn Browser,
    cluster: &BrowserCluster,
) -> Result<ExecStats, JobError> {
    let mut stats = ExecStats::default();

    let code = browser.load(&resource.url).await?;
    stats.pages_loaded += 1;
    cluster.push_to_sitemap(&resource.url, code)?;

    let page = browser.to_page();
    for transition in &page.transitions {
        let action = transition.action_fingerprint();
        if !cluster.mark_skipped(job.id(), &action)? {
            continue;
        }

        browser.load(&resource.url).await?;
        stats.pages_loaded += 1;

        if let Err(error) = browser
            .fire_event(&transition.locator, &transition.event, Some(&options.taint))
            .await
        {
            if error.is_fatal() {
                return Err(error.into());
            }
            debug!(job_id = %job.id(), action = %action, error = %error, "event failed");
            continue;
        }

        let after = browser.to_page();
        if after.body.contains(&options.taint) {
            cluster.handle_result(JobResult::new(
                job.clone(),
                json!({
                    "taint": options.taint,
                    "action": action,
                    "page": after,
                }),
            ))?;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::stub::{StubLauncher, StubSite};
    use crate::browser::{BrowserLauncher, ElementLocator, Page};
    use crate::cluster::{BrowserCluster, ClusterConfig};
    use std::sync::{Arc, Mutex};

    fn workerless_cluster() -> BrowserCluster {
        BrowserCluster::new(
            ClusterConfig::default().with_pool_size(0),
            Arc::new(StubLauncher::new(StubSite::new())),
        )
    }

    fn form_site() -> StubSite {
        StubSite::new()
            .page(
                Page::new("https://site.test/search", 200)
                    .with_transition(ElementLocator::new("input[name=q]"), "submit")
                    .with_transition(ElementLocator::new("input[name=lang]"), "submit"),
            )
            // q is reflected into the results page, lang is not.
            .effect(
                "https://site.test/search",
                "submit#input[name=q]",
                Page::new("https://site.test/results", 200).with_body("results for {value}"),
            )
            .effect(
                "https://site.test/search",
                "submit#input[name=lang]",
                Page::new("https://site.test/results", 200).with_body("results"),
            )
    }

    #[tokio::test]
    async fn test_reports_only_reflecting_inputs() {
        let launcher = StubLauncher::new(form_site());
        let cluster = workerless_cluster();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let job = Job::taint_trace(
            Resource::new("https://site.test/search"),
            TaintOptions::new("taint_7f3a"),
        );
        cluster
            .queue(job.clone(), move |result: JobResult| {
                sink.lock().unwrap().push(result.payload)
            })
            .unwrap();

        let mut browser = launcher.launch(cluster.js_token()).await.unwrap();
        let stats = job.execute(browser.as_mut(), &cluster).await.unwrap();

        // Landing load plus one reload per transition.
        assert_eq!(stats.pages_loaded, 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["taint"], "taint_7f3a");
        assert_eq!(seen[0]["action"], "submit#input[name=q]");
        assert!(seen[0]["page"]["body"]
            .as_str()
            .unwrap()
            .contains("taint_7f3a"));
    }

    #[tokio::test]
    async fn test_each_input_is_claimed_once() {
        let launcher = StubLauncher::new(form_site());
        let cluster = workerless_cluster();

        let job = Job::taint_trace(
            Resource::new("https://site.test/search"),
            TaintOptions::new("t"),
        );
        cluster.queue(job.clone(), |_| {}).unwrap();

        let mut browser = launcher.launch(cluster.js_token()).await.unwrap();
        job.execute(browser.as_mut(), &cluster).await.unwrap();

        // Both fingerprints are now claimed; a rerun fires nothing.
        let counters = launcher.counters();
        let events_after_first = counters.events();
        job.execute(browser.as_mut(), &cluster).await.unwrap();
        assert_eq!(counters.events(), events_after_first);
    }
}
