//! Page snapshots and DOM transition descriptors.
//!
//! These are thin, serializable carriers. The scheduler treats them as
//! opaque data; only job bodies look inside.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Locates a DOM element within a page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementLocator {
    /// CSS selector uniquely identifying the element.
    pub css: String,
}

impl ElementLocator {
    /// Creates a locator from a CSS selector.
    pub fn new(css: impl Into<String>) -> Self {
        Self { css: css.into() }
    }
}

impl fmt::Display for ElementLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.css)
    }
}

/// An event-driven state transition available on a page.
///
/// A transition pairs an element with the DOM event that can be fired on
/// it (`click`, `submit`, `input`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Element the event targets.
    pub locator: ElementLocator,
    /// DOM event name.
    pub event: String,
}

impl Transition {
    /// Creates a transition.
    pub fn new(locator: ElementLocator, event: impl Into<String>) -> Self {
        Self {
            locator,
            event: event.into(),
        }
    }

    /// Returns the action fingerprint for this transition, e.g. `click#btn`.
    ///
    /// Fingerprints are the keys of the cross-worker skip registry: two
    /// workers proposing the same transition on the same job produce the
    /// same string.
    pub fn action_fingerprint(&self) -> String {
        format!("{}#{}", self.event, self.locator)
    }
}

/// Snapshot of a loaded page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// URL of the main document.
    pub url: String,
    /// HTTP status code of the main document.
    pub code: u16,
    /// Rendered body.
    pub body: String,
    /// Event-driven transitions discovered on the page.
    pub transitions: Vec<Transition>,
}

impl Page {
    /// Creates a page snapshot with no body and no transitions.
    pub fn new(url: impl Into<String>, code: u16) -> Self {
        Self {
            url: url.into(),
            code,
            body: String::new(),
            transitions: Vec::new(),
        }
    }

    /// Sets the rendered body (builder pattern).
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a transition (builder pattern).
    pub fn with_transition(mut self, locator: ElementLocator, event: impl Into<String>) -> Self {
        self.transitions.push(Transition::new(locator, event));
        self
    }

    /// Synthesizes a not-found snapshot for `url`.
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::new(url, 404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_fingerprint_format() {
        let transition = Transition::new(ElementLocator::new("btn"), "click");
        assert_eq!(transition.action_fingerprint(), "click#btn");
    }

    #[test]
    fn test_fingerprint_distinguishes_event_and_element() {
        let click = Transition::new(ElementLocator::new("#submit"), "click");
        let hover = Transition::new(ElementLocator::new("#submit"), "mouseover");
        assert_ne!(click.action_fingerprint(), hover.action_fingerprint());
    }

    #[test]
    fn test_page_builder() {
        let page = Page::new("https://example.com/", 200)
            .with_body("<html></html>")
            .with_transition(ElementLocator::new("#go"), "click");

        assert_eq!(page.code, 200);
        assert_eq!(page.body, "<html></html>");
        assert_eq!(page.transitions.len(), 1);
        assert_eq!(page.transitions[0].event, "click");
    }

    #[test]
    fn test_not_found() {
        let page = Page::not_found("https://example.com/missing");
        assert_eq!(page.code, 404);
        assert!(page.transitions.is_empty());
    }

    #[test]
    fn test_page_serde_round_trip() {
        let page = Page::new("https://example.com/", 200)
            .with_transition(ElementLocator::new("#a"), "click");
        let json = serde_json::to_string(&page).unwrap();
        let back: Page = serde_json::from_str(&json).unwrap();
        assert_eq!(back, page);
    }
}
