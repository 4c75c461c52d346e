//! Reading simulation on a job detail tab.
//!
//! Before the chat widget is touched, the tab is browsed like a human
//! reader: a few staged scrolls with jittered pauses. Detail tabs can
//! be torn down under us by a navigation race (risk redirects, expired
//! postings), so every stage re-checks that the page still belongs to
//! the platform before acting on it.

use std::time::Duration;

use rand::Rng;
use tracing::debug;
use url::Url;

use crate::browser::{BrowserError, BrowserPage};

/// Reading stages per detail page.
const STAGES: u32 = 3;

/// Scroll distance range per stage, pixels.
const SCROLL_MIN: i64 = 240;
const SCROLL_MAX: i64 = 640;

/// Upward glance before acting, pixels.
const GLANCE_BACK: i64 = -160;

/// Validity guard for a detail tab.
#[derive(Debug, Clone, Copy)]
pub struct PageGuard {
    /// Host fragment every live platform page carries.
    pub domain_fragment: &'static str,
    /// Selector rendered on the platform's error interstitial.
    pub error_marker: &'static str,
}

impl PageGuard {
    /// True while the tab is still a live platform page: URL host on
    /// the expected domain and no error marker rendered. Any failure to
    /// read the page counts as invalid.
    pub async fn is_valid(&self, page: &dyn BrowserPage) -> bool {
        let Ok(url) = page.current_url().await else {
            return false;
        };
        let on_domain = Url::parse(&url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|h| h.contains(self.domain_fragment)))
            .unwrap_or(false);
        if !on_domain {
            return false;
        }
        !page.is_visible(self.error_marker).await.unwrap_or(true)
    }
}

/// Browses the tab like a reader. Returns `Ok(false)` when the guard
/// tripped before the stages finished; the caller should treat the tab
/// as unreachable rather than keep driving it.
pub async fn browse_like_human(
    page: &dyn BrowserPage,
    guard: PageGuard,
    pause_base_ms: u64,
) -> Result<bool, BrowserError> {
    for stage in 0..STAGES {
        if !guard.is_valid(page).await {
            debug!(stage, "detail page no longer valid, stopping simulation");
            return Ok(false);
        }
        let pixels = rand::thread_rng().gen_range(SCROLL_MIN..=SCROLL_MAX);
        page.scroll_by(pixels).await?;
        tokio::time::sleep(jittered(pause_base_ms)).await;
    }
    page.scroll_by(GLANCE_BACK).await?;
    Ok(true)
}

/// Pause around `base_ms` with up to 50% spread either way.
fn jittered(base_ms: u64) -> Duration {
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let spread = base_ms / 2;
    Duration::from_millis(rand::thread_rng().gen_range(base_ms - spread..=base_ms + spread))
}
