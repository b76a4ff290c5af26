//! Canned in-memory browser for tests and dry runs.
//!
//! [`StubBrowser`] serves pages from a [`StubSite`] model instead of a real
//! driver process, and every instance reports lifecycle activity into a
//! shared [`BrowserCounters`]. This is the null-adapter of the browser
//! boundary: the scheduler can be exercised end to end without a browser
//! binary on the machine.

use super::page::{ElementLocator, Page};
use super::{Browser, BrowserError, BrowserLauncher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Activity counters shared by every browser a [`StubLauncher`] produces.
#[derive(Debug, Default)]
pub struct BrowserCounters {
    launched: AtomicUsize,
    loads: AtomicUsize,
    events: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl BrowserCounters {
    /// Number of browsers launched.
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    /// Number of page loads across all browsers.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of DOM events fired across all browsers.
    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }

    /// Number of browser shutdowns.
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

/// In-memory site model served by [`StubBrowser`].
///
/// Pages are registered by URL; event effects are registered per
/// `(page URL, action fingerprint)` pair and replace the current page when
/// the matching event fires. An effect body may contain the `{value}`
/// placeholder, which is substituted with the fired input value, enough
/// to model reflected input for taint tests.
#[derive(Debug, Default)]
pub struct StubSite {
    pages: HashMap<String, Page>,
    effects: HashMap<(String, String), Page>,
    delays: HashMap<String, Duration>,
}

impl StubSite {
    /// Creates an empty site.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page under its own URL (builder pattern).
    pub fn page(mut self, page: Page) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    /// Registers the page an event produces (builder pattern).
    ///
    /// `action` is the transition fingerprint, e.g. `click#btn`.
    pub fn effect(mut self, url: impl Into<String>, action: impl Into<String>, page: Page) -> Self {
        self.effects.insert((url.into(), action.into()), page);
        self
    }

    /// Adds artificial latency to loads of `url` (builder pattern).
    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }
}

/// A browser that serves canned pages from a [`StubSite`].
pub struct StubBrowser {
    js_token: String,
    site: Arc<StubSite>,
    current: Page,
    counters: Arc<BrowserCounters>,
}

impl StubBrowser {
    /// The JS namespace token this browser was launched with.
    pub fn js_token(&self) -> &str {
        &self.js_token
    }
}

#[async_trait]
impl Browser for StubBrowser {
    async fn load(&mut self, url: &str) -> Result<u16, BrowserError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.site.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.current = self
            .site
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| Page::not_found(url));
        Ok(self.current.code)
    }

    async fn fire_event(
        &mut self,
        locator: &ElementLocator,
        event: &str,
        value: Option<&str>,
    ) -> Result<(), BrowserError> {
        self.counters.events.fetch_add(1, Ordering::SeqCst);
        let key = (self.current.url.clone(), format!("{}#{}", event, locator));
        if let Some(next) = self.site.effects.get(&key) {
            let mut next = next.clone();
            if let Some(value) = value {
                next.body = next.body.replace("{value}", value);
            }
            self.current = next;
        }
        Ok(())
    }

    fn to_page(&self) -> Page {
        self.current.clone()
    }

    async fn shutdown(&mut self) {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Launcher producing [`StubBrowser`] instances over a shared site model.
pub struct StubLauncher {
    site: Arc<StubSite>,
    counters: Arc<BrowserCounters>,
}

impl StubLauncher {
    /// Creates a launcher serving `site`.
    pub fn new(site: StubSite) -> Self {
        Self {
            site: Arc::new(site),
            counters: Arc::new(BrowserCounters::default()),
        }
    }

    /// Shared activity counters for all browsers this launcher produced.
    pub fn counters(&self) -> Arc<BrowserCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl BrowserLauncher for StubLauncher {
    async fn launch(&self, js_token: &str) -> Result<Box<dyn Browser>, BrowserError> {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubBrowser {
            js_token: js_token.to_string(),
            site: Arc::clone(&self.site),
            current: Page::default(),
            counters: Arc::clone(&self.counters),
        }))
    }
}
