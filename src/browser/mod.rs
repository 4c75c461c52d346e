//! Browser page facade used by every pipeline component.
//!
//! The engine never talks to a browser binding directly. It drives a
//! [`BrowserPage`] trait object so the same collection, filter and
//! delivery logic runs against a real CDP-backed page, or against the
//! in-memory [`ScriptedPage`] used by the `simulate` command and the
//! test suites.
//!
//! # Object Safety
//!
//! This trait uses `async_trait` to support dynamic dispatch via
//! `Arc<dyn BrowserPage>`. Rust 2024 native async traits are not
//! object-safe, so `async_trait` is required for the facade pattern.

mod scripted;

pub use scripted::{PageAction, PageScript, Route, ScriptedPage, ScrollBatch};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// A browser cookie as serialized to and from the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie is scoped to.
    pub domain: String,
    /// Path the cookie is scoped to.
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Expiry as unix seconds; `None` for session cookies.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// A network response captured by an interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptedResponse {
    /// Full request URL.
    pub url: String,
    /// Response body as text (listing payloads are JSON).
    pub body: String,
}

/// Predicate deciding which response URLs an interceptor captures.
pub type UrlMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Errors surfaced by a browser page implementation.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Navigation failed (network, bad URL, blocked).
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL.
        url: String,
        /// Backend-provided cause.
        message: String,
    },

    /// An interaction targeted a selector with no matching element.
    #[error("element not found: {selector}")]
    ElementMissing {
        /// The selector that matched nothing.
        selector: String,
    },

    /// The page or tab has already been closed.
    #[error("page already closed")]
    TabClosed,

    /// Any other backend failure.
    #[error("browser backend error: {0}")]
    Backend(String),
}

impl BrowserError {
    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an element-missing error.
    pub fn element_missing(selector: impl Into<String>) -> Self {
        Self::ElementMissing {
            selector: selector.into(),
        }
    }
}

/// Facade over a single browser page (or tab).
///
/// Selector strings are adapter-supplied data; this trait never
/// interprets them. Bounded waits report expiry through `Ok(false)`
/// rather than an error so callers can treat "not there" as a normal
/// outcome (limit dialogs, empty result pages).
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigates to `url` and waits for the load to settle.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Reloads the current page.
    async fn reload(&self) -> Result<(), BrowserError>;

    /// Returns the current page URL.
    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Returns the number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize, BrowserError>;

    /// Returns the text of the first element matching `selector`, or
    /// `None` when nothing matches.
    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// True when at least one element matching `selector` is attached
    /// and visible right now.
    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Waits up to `timeout` for `selector` to become visible.
    ///
    /// Returns `Ok(true)` when it appeared, `Ok(false)` on expiry.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    /// Clicks the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Replaces the value of the first element matching `selector`.
    async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// Sends an Enter keypress to the first element matching `selector`.
    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError>;

    /// Moves the pointer over the first element matching `selector`.
    async fn hover(&self, selector: &str) -> Result<(), BrowserError>;

    /// Scrolls the viewport down by `pixels`.
    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError>;

    /// Scrolls to the bottom of the page.
    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    /// Attaches `path` to the first file input matching `selector`.
    async fn upload_file(&self, selector: &str, path: &Path) -> Result<(), BrowserError>;

    /// Registers a response interceptor.
    ///
    /// Every response whose URL satisfies `matcher` is forwarded to
    /// `sink` from registration time onward. Must be called before the
    /// navigation whose responses it is meant to capture.
    async fn intercept_responses(
        &self,
        matcher: UrlMatcher,
        sink: mpsc::UnboundedSender<InterceptedResponse>,
    ) -> Result<(), BrowserError>;

    /// Returns the cookies visible to the current page.
    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError>;

    /// Injects cookies into the browser context.
    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError>;

    /// Opens a new tab in the same browser context and navigates it.
    async fn open_tab(&self, url: &str) -> Result<Arc<dyn BrowserPage>, BrowserError>;

    /// Closes this page. Further calls return [`BrowserError::TabClosed`].
    async fn close(&self) -> Result<(), BrowserError>;
}
