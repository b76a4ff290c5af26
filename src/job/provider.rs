//! Browser-provider job.
//!
//! The provider's sole effect is to hand its assigned worker's browser
//! state to the registered callback. The callback receives the browser's
//! current page snapshot; live browsers stay owned by their worker.

use super::{ExecStats, Job, JobError};
use crate::browser::Browser;
use crate::cluster::BrowserCluster;
use crate::job::JobResult;

pub(super) async fn run(
    job: &Job,
    browser: &mut dyn Browser,
    cluster: &BrowserCluster,
) -> Result<ExecStats, JobError> {
    let page = browser.to_page();
    cluster.handle_result(JobResult::new(job.clone(), serde_json::to_value(&page)?))?;
    Ok(ExecStats::default())
}
