//! In-memory [`BrowserPage`] implementation driven by a declarative script.
//!
//! `ScriptedPage` models just enough of a page for the engine: a flat
//! selector -> element map, substring-matched navigation routes that
//! swap the DOM and replay captured payloads, and a queue of scroll
//! batches for infinite-scroll listings. It backs the `simulate`
//! command and the integration tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BrowserError, BrowserPage, Cookie, InterceptedResponse, UrlMatcher};

/// Poll interval for bounded visibility waits.
const WAIT_POLL_MS: u64 = 50;

/// One scriptable element.
#[derive(Debug, Clone)]
struct Element {
    visible: bool,
    text: String,
    count: usize,
    /// Clicking navigates the page here (pagination controls).
    click_navigates_to: Option<String>,
}

impl Default for Element {
    fn default() -> Self {
        Self {
            visible: true,
            text: String::new(),
            count: 1,
            click_navigates_to: None,
        }
    }
}

/// DOM and network behavior applied when the page navigates to a URL
/// containing the route's fragment. First matching route wins.
#[derive(Debug, Clone, Default)]
pub struct Route {
    url_contains: String,
    elements: Vec<(String, Element)>,
    responses: Vec<InterceptedResponse>,
    fail_with: Option<String>,
}

impl Route {
    /// Creates a route matched by URL substring.
    #[must_use]
    pub fn matching(url_contains: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
            ..Self::default()
        }
    }

    /// Adds a visible element with defaults.
    #[must_use]
    pub fn element(mut self, selector: impl Into<String>) -> Self {
        self.elements.push((selector.into(), Element::default()));
        self
    }

    /// Adds a present but hidden element.
    #[must_use]
    pub fn hidden_element(mut self, selector: impl Into<String>) -> Self {
        self.elements.push((
            selector.into(),
            Element {
                visible: false,
                ..Element::default()
            },
        ));
        self
    }

    /// Adds a visible element with text content.
    #[must_use]
    pub fn element_text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.push((
            selector.into(),
            Element {
                text: text.into(),
                ..Element::default()
            },
        ));
        self
    }

    /// Adds a visible element with a match count (card lists).
    #[must_use]
    pub fn element_count(mut self, selector: impl Into<String>, count: usize) -> Self {
        self.elements.push((
            selector.into(),
            Element {
                count,
                ..Element::default()
            },
        ));
        self
    }

    /// Adds a control that navigates the page when clicked.
    #[must_use]
    pub fn element_navigating(
        mut self,
        selector: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.elements.push((
            selector.into(),
            Element {
                click_navigates_to: Some(target.into()),
                ..Element::default()
            },
        ));
        self
    }

    /// Queues a network response replayed to matching interceptors when
    /// this route loads.
    #[must_use]
    pub fn respond(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses.push(InterceptedResponse {
            url: url.into(),
            body: body.into(),
        });
        self
    }

    /// Makes navigation to this route fail.
    #[must_use]
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }
}

/// Elements and payloads applied by one `scroll_to_bottom` call.
#[derive(Debug, Clone, Default)]
pub struct ScrollBatch {
    responses: Vec<InterceptedResponse>,
    counts: Vec<(String, usize)>,
}

impl ScrollBatch {
    /// Creates an empty batch (a scroll that loads nothing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a payload replayed to matching interceptors.
    #[must_use]
    pub fn respond(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses.push(InterceptedResponse {
            url: url.into(),
            body: body.into(),
        });
        self
    }

    /// Updates an element's match count after the scroll.
    #[must_use]
    pub fn set_count(mut self, selector: impl Into<String>, count: usize) -> Self {
        self.counts.push((selector.into(), count));
        self
    }
}

/// Declarative behavior for a [`ScriptedPage`] and the tabs it opens.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    routes: Vec<Route>,
    scroll_batches: Vec<ScrollBatch>,
    cookies: Vec<Cookie>,
}

impl PageScript {
    /// Creates an empty script: every navigation lands on a blank page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a navigation route. Earlier routes win ties.
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Queues a scroll batch; batches are consumed in order, one per
    /// `scroll_to_bottom`, after which scrolling changes nothing.
    #[must_use]
    pub fn on_scroll(mut self, batch: ScrollBatch) -> Self {
        self.scroll_batches.push(batch);
        self
    }

    /// Seeds the browser context's cookie jar.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }
}

/// Everything a page interaction can do, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    /// A navigation, with the target URL.
    Navigated(String),
    /// A reload of the current URL.
    Reloaded(String),
    /// A click, with the selector.
    Clicked(String),
    /// A fill, with selector and text.
    Filled(String, String),
    /// An Enter keypress, with the selector.
    PressedEnter(String),
    /// A hover, with the selector.
    Hovered(String),
    /// A scroll by pixel delta.
    ScrolledBy(i64),
    /// A scroll to the bottom of the page.
    ScrolledToBottom,
    /// A file upload, with selector and path.
    Uploaded(String, String),
    /// Cookies injected into the context.
    CookiesSet(usize),
    /// A new tab opened at the URL.
    TabOpened(String),
    /// This page was closed.
    Closed,
}

#[derive(Default)]
struct PageState {
    closed: bool,
    current_url: String,
    elements: HashMap<String, Element>,
    cookies: Vec<Cookie>,
    scroll_batches: Vec<ScrollBatch>,
    interceptors: Vec<(UrlMatcher, mpsc::UnboundedSender<InterceptedResponse>)>,
}

/// Scripted in-memory page. Cheap to clone handles via [`Arc`];
/// tabs opened from a page share its script and action log.
pub struct ScriptedPage {
    routes: Arc<Vec<Route>>,
    state: Mutex<PageState>,
    log: Arc<Mutex<Vec<PageAction>>>,
}

impl ScriptedPage {
    /// Builds a page from a script. The page starts blank; call
    /// [`BrowserPage::navigate`] to load a route.
    #[must_use]
    pub fn new(script: PageScript) -> Arc<Self> {
        Arc::new(Self {
            routes: Arc::new(script.routes),
            state: Mutex::new(PageState {
                cookies: script.cookies,
                scroll_batches: script.scroll_batches,
                ..PageState::default()
            }),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// A page with no routes at all.
    #[must_use]
    pub fn blank() -> Arc<Self> {
        Self::new(PageScript::new())
    }

    /// Snapshot of every action performed on this page and its tabs.
    #[must_use]
    pub fn actions(&self) -> Vec<PageAction> {
        self.lock_log().clone()
    }

    /// Flips an element's visibility from outside (monitor tests,
    /// scan-login simulation). Creates the element when missing.
    pub fn set_visible(&self, selector: &str, visible: bool) {
        let mut state = self.lock_state();
        state
            .elements
            .entry(selector.to_string())
            .or_default()
            .visible = visible;
    }

    /// Overwrites an element's text from outside.
    pub fn set_text(&self, selector: &str, text: impl Into<String>) {
        let mut state = self.lock_state();
        state.elements.entry(selector.to_string()).or_default().text = text.into();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PageState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<PageAction>> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, action: PageAction) {
        self.lock_log().push(action);
    }

    fn ensure_open(state: &PageState) -> Result<(), BrowserError> {
        if state.closed {
            return Err(BrowserError::TabClosed);
        }
        Ok(())
    }

    /// Applies the first route matching `url`, replaying its payloads
    /// to registered interceptors.
    fn load(&self, url: &str) -> Result<(), BrowserError> {
        let route = self
            .routes
            .iter()
            .find(|r| !r.url_contains.is_empty() && url.contains(&r.url_contains))
            .cloned();

        let mut state = self.lock_state();
        Self::ensure_open(&state)?;
        state.current_url = url.to_string();
        state.elements.clear();

        let Some(route) = route else {
            return Ok(());
        };
        if let Some(message) = &route.fail_with {
            return Err(BrowserError::navigation(url, message.clone()));
        }
        for (selector, element) in route.elements {
            state.elements.insert(selector, element);
        }
        Self::replay(&state, &route.responses);
        Ok(())
    }

    fn replay(state: &PageState, responses: &[InterceptedResponse]) {
        for response in responses {
            for (matcher, sink) in &state.interceptors {
                if matcher(&response.url) {
                    let _ = sink.send(response.clone());
                }
            }
        }
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.record(PageAction::Navigated(url.to_string()));
        self.load(url)
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        let url = {
            let state = self.lock_state();
            Self::ensure_open(&state)?;
            state.current_url.clone()
        };
        self.record(PageAction::Reloaded(url.clone()));
        self.load(&url)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        Ok(state.current_url.clone())
    }

    async fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        Ok(state.elements.get(selector).map_or(0, |e| e.count))
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        Ok(state.elements.get(selector).map(|e| e.text.clone()))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        Ok(state.elements.get(selector).is_some_and(|e| e.visible))
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_visible(selector).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS)).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.record(PageAction::Clicked(selector.to_string()));
        let target = {
            let state = self.lock_state();
            Self::ensure_open(&state)?;
            let Some(element) = state.elements.get(selector) else {
                return Err(BrowserError::element_missing(selector));
            };
            element.click_navigates_to.clone()
        };
        if let Some(url) = target {
            self.record(PageAction::Navigated(url.clone()));
            self.load(&url)?;
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let mut state = self.lock_state();
        Self::ensure_open(&state)?;
        if !state.elements.contains_key(selector) {
            return Err(BrowserError::element_missing(selector));
        }
        drop(state);
        self.record(PageAction::Filled(selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<(), BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        if !state.elements.contains_key(selector) {
            return Err(BrowserError::element_missing(selector));
        }
        drop(state);
        self.record(PageAction::PressedEnter(selector.to_string()));
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<(), BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        if !state.elements.contains_key(selector) {
            return Err(BrowserError::element_missing(selector));
        }
        drop(state);
        self.record(PageAction::Hovered(selector.to_string()));
        Ok(())
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        drop(state);
        self.record(PageAction::ScrolledBy(pixels));
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.record(PageAction::ScrolledToBottom);
        let mut state = self.lock_state();
        Self::ensure_open(&state)?;
        if state.scroll_batches.is_empty() {
            return Ok(());
        }
        let batch = state.scroll_batches.remove(0);
        for (selector, count) in &batch.counts {
            state.elements.entry(selector.clone()).or_default().count = *count;
        }
        Self::replay(&state, &batch.responses);
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &Path) -> Result<(), BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        if !state.elements.contains_key(selector) {
            return Err(BrowserError::element_missing(selector));
        }
        drop(state);
        self.record(PageAction::Uploaded(
            selector.to_string(),
            path.display().to_string(),
        ));
        Ok(())
    }

    async fn intercept_responses(
        &self,
        matcher: UrlMatcher,
        sink: mpsc::UnboundedSender<InterceptedResponse>,
    ) -> Result<(), BrowserError> {
        let mut state = self.lock_state();
        Self::ensure_open(&state)?;
        state.interceptors.push((matcher, sink));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, BrowserError> {
        let state = self.lock_state();
        Self::ensure_open(&state)?;
        Ok(state.cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), BrowserError> {
        let mut state = self.lock_state();
        Self::ensure_open(&state)?;
        for cookie in cookies {
            state.cookies.retain(|c| c.name != cookie.name);
            state.cookies.push(cookie.clone());
        }
        drop(state);
        self.record(PageAction::CookiesSet(cookies.len()));
        Ok(())
    }

    async fn open_tab(&self, url: &str) -> Result<Arc<dyn BrowserPage>, BrowserError> {
        {
            let state = self.lock_state();
            Self::ensure_open(&state)?;
        }
        self.record(PageAction::TabOpened(url.to_string()));
        let tab = Arc::new(Self {
            routes: Arc::clone(&self.routes),
            state: Mutex::new(PageState::default()),
            log: Arc::clone(&self.log),
        });
        tab.load(url)?;
        Ok(tab)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(BrowserError::TabClosed);
        }
        state.closed = true;
        drop(state);
        self.record(PageAction::Closed);
        Ok(())
    }
}
