//! Browser capability boundary.
//!
//! The cluster never talks to a real browser directly; it goes through the
//! [`Browser`] trait, and workers (re)create browsers through a
//! [`BrowserLauncher`]. The embedding framework supplies implementations
//! backed by an actual headless-browser driver; [`stub`] provides a canned
//! in-memory implementation for tests and dry runs.
//!
//! Workers never peek past this trait: loading a page, firing a DOM event,
//! snapshotting the current page, and tearing the process down is the
//! entire surface the scheduler needs.

mod page;
pub mod stub;

pub use page::{ElementLocator, Page, Transition};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a browser driver.
///
/// Fatal errors ([`BrowserError::Spawn`], [`BrowserError::Crashed`]) mean
/// the browser process is unusable and the owning worker must recycle it.
/// The remaining variants are per-action failures the worker logs and
/// moves past.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser process could not be spawned
    #[error("browser spawn failed: {0}")]
    Spawn(String),

    /// The browser process died underneath us
    #[error("browser crashed")]
    Crashed,

    /// Navigation to a URL failed
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// The driver protocol reported an error for a single operation
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Returns true if the browser process is beyond recovery and the
    /// owning worker should recycle it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn(_) | Self::Crashed)
    }
}

/// A controllable headless browser owned by exactly one worker.
///
/// Implementations wrap a real driver process. All mutation goes through
/// `&mut self`; the cluster guarantees no two tasks share a browser.
#[async_trait]
pub trait Browser: Send {
    /// Navigates to `url` and returns the HTTP status code of the main
    /// document once the page has settled.
    async fn load(&mut self, url: &str) -> Result<u16, BrowserError>;

    /// Fires a DOM event on the element identified by `locator`,
    /// optionally filling the element with `value` first.
    async fn fire_event(
        &mut self,
        locator: &ElementLocator,
        event: &str,
        value: Option<&str>,
    ) -> Result<(), BrowserError>;

    /// Snapshots the currently loaded page.
    fn to_page(&self) -> Page;

    /// Terminates the browser process and frees its resources.
    async fn shutdown(&mut self);
}

/// Factory for browser processes.
///
/// Workers call this on start and again on every recycle. The `js_token`
/// is the cluster-wide random namespace string the driver uses to isolate
/// injected DOM state between concurrent audits.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Spawns a fresh browser process.
    async fn launch(&self, js_token: &str) -> Result<Box<dyn Browser>, BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(BrowserError::Spawn("no binary".into()).is_fatal());
        assert!(BrowserError::Crashed.is_fatal());
        assert!(!BrowserError::Protocol("stale node".into()).is_fatal());
        assert!(!BrowserError::Navigation {
            url: "https://example.com/".into(),
            message: "timeout".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = BrowserError::Navigation {
            url: "https://example.com/".into(),
            message: "connection refused".into(),
        };
        assert_eq!(
            format!("{}", err),
            "navigation to https://example.com/ failed: connection refused"
        );
        assert_eq!(format!("{}", BrowserError::Crashed), "browser crashed");
    }
}
