//! Resource exploration job.
//!
//! Loads a resource, reports the landing page, then drives every
//! event-driven transition the page exposes. Each transition is claimed in
//! the cluster's skip registry before it is fired, so equivalent actions
//! proposed by concurrent workers run exactly once per job id. Navigating
//! transitions fan out into forwarded child explorations until the depth
//! budget is spent.

use super::{ExecStats, Job, JobError, JobPayload, Resource};
use crate::browser::Browser;
use crate::cluster::BrowserCluster;
use crate::job::JobResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Default number of navigation hops an exploration descends.
pub const DEFAULT_EXPLORE_DEPTH: u32 = 1;

/// Parameters for an exploration job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreOptions {
    /// Remaining navigation hops. A transition that navigates away spawns
    /// a child exploration with `depth - 1`; zero stops the descent.
    pub depth: u32,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_EXPLORE_DEPTH,
        }
    }
}

impl ExploreOptions {
    /// Sets the descent depth (builder pattern).
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Options for one hop deeper.
    fn descend(&self) -> Self {
        Self {
            depth: self.depth.saturating_sub(1),
        }
    }
}

pub(super) async fn run(
    job: &Job,
    resource: &Resource,
    options: &ExploreOptions,
    browser: &mut dyn Browser,
    cluster: &BrowserCluster,
) -> Result<ExecStats, JobError> {
    let mut stats = ExecStats::default();

    let code = browser.load(&resource.url).await?;
    stats.pages_loaded += 1;
    cluster.push_to_sitemap(&resource.url, code)?;

    let page = browser.to_page();
    cluster.handle_result(JobResult::new(job.clone(), serde_json::to_value(&page)?))?;

    for transition in &page.transitions {
        let action = transition.action_fingerprint();
        if cluster.is_skipped(job.id(), &action)? {
            continue;
        }
        if !cluster.mark_skipped(job.id(), &action)? {
            // Another worker claimed the action between the check and now.
            continue;
        }

        // Restore pristine page state before each event.
        browser.load(&resource.url).await?;
        stats.pages_loaded += 1;

        if let Err(error) = browser
            .fire_event(&transition.locator, &transition.event, None)
            .await
        {
            if error.is_fatal() {
                return Err(error.into());
            }
            debug!(job_id = %job.id(), action = %action, error = %error, "event failed");
            continue;
        }

        let after = browser.to_page();
        if after.url != page.url {
            cluster.push_to_sitemap(&after.url, after.code)?;
        }
        cluster.handle_result(JobResult::new(
            job.clone(),
            json!({ "action": action, "page": after }),
        ))?;

        if options.depth > 0 && after.url != resource.url {
            let child = job.forward(JobPayload::Exploration {
                resource: Resource::new(&after.url),
                options: options.descend(),
            });
            cluster.requeue(child)?;
        }
    }

    Ok(stats)
}
