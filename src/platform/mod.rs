//! Platform adapters: everything site-specific behind one trait.
//!
//! Each recruiting site differs in URL scheme, listing API envelope,
//! selector catalog, paging behavior, and anti-bot signaling. The
//! engine never branches on a platform name; it asks the adapter.
//!
//! - [`PlatformAdapter`] - per-site trait the engine drives
//! - [`AdapterRegistry`] - platform -> adapter lookup
//! - [`BossAdapter`] - Boss直聘 (scroll-fed listing API)
//! - [`Job51Adapter`] - 前程无忧 (paginated legacy search)
//! - [`LiepinAdapter`] - 猎聘 (scroll-fed card API)
//! - [`ZhilianAdapter`] - 智联招聘 (paginated position API)

mod boss;
mod job51;
mod liepin;
mod zhilian;

pub use boss::BossAdapter;
pub use job51::Job51Adapter;
pub use liepin::LiepinAdapter;
pub use zhilian::ZhilianAdapter;

use crate::collect::ScrapeError;
use crate::config::SearchFilters;
use crate::record::{JobRecord, Platform};
use crate::session::LoginPlan;

/// How a platform's listing grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// Infinite scroll; new cards appear on scroll-to-bottom.
    Scroll,
    /// Explicit numbered pages behind a "next page" control.
    Paged,
}

impl PagingMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scroll => "scroll",
            Self::Paged => "paged",
        }
    }
}

/// Selectors the collector needs on a listing page.
#[derive(Debug, Clone, Copy)]
pub struct CollectSelectors {
    /// List container that must appear before a pass counts as loaded.
    pub list_container: &'static str,
    /// One job card; the card count drives scroll stability.
    pub job_card: &'static str,
    /// "Next page" control (paged platforms).
    pub next_page: &'static str,
    /// Last pagination control; its text carries the page ceiling.
    pub last_page_hint: &'static str,
}

/// Selectors the delivery flow needs on a detail page.
#[derive(Debug, Clone, Copy)]
pub struct DeliverSelectors {
    /// Daily-limit dialog marker.
    pub limit_dialog: &'static str,
    /// Chat/apply trigger.
    pub chat_button: &'static str,
    /// Greeting input, present once the chat widget opens.
    pub message_input: &'static str,
    /// Send control.
    pub send_button: &'static str,
    /// File input for the resume image.
    pub resume_input: &'static str,
    /// Error-page marker for the validity guard.
    pub error_marker: &'static str,
}

/// Site-specific behavior behind one object-safe trait.
///
/// Adapters are pure data and parsing; they never touch the page
/// themselves. All browser driving stays in the engine so that the
/// collect/deliver flows are identical across platforms.
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter drives.
    fn platform(&self) -> Platform;

    /// Login flow description for the session manager.
    fn login_plan(&self) -> LoginPlan;

    /// Domain fragment every page URL of this platform contains; the
    /// delivery validity guard checks it against the current URL.
    fn domain_fragment(&self) -> &'static str;

    /// Benign page visited during a token refresh.
    fn benign_url(&self) -> &'static str;

    /// Listing API code treated as the anti-bot signal.
    fn anti_bot_code(&self) -> i64;

    /// How the listing grows.
    fn paging(&self) -> PagingMode;

    /// Substring identifying the job-list API in response URLs.
    fn list_api_marker(&self) -> &'static str;

    /// Builds the search URL for one (city, keyword) pass. Absent
    /// filters are omitted; `page` is ignored by scroll platforms.
    fn search_url(&self, city: &str, keyword: &str, filters: &SearchFilters, page: usize)
    -> String;

    fn collect_selectors(&self) -> CollectSelectors;

    fn deliver_selectors(&self) -> DeliverSelectors;

    /// Parses one intercepted list-API payload into records.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ApiRejected`] when the envelope carries a
    /// platform error code, [`ScrapeError::MalformedPayload`] for
    /// bodies that do not parse.
    fn parse_listing(&self, body: &str) -> Result<Vec<JobRecord>, ScrapeError>;
}

/// Platform -> adapter lookup, registration order preserved.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn PlatformAdapter>) {
        self.adapters.push(adapter);
    }

    /// Looks up the adapter for a platform.
    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&dyn PlatformAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.platform() == platform)
            .map(AsRef::as_ref)
    }

    /// Registered platforms in registration order.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.iter().map(|a| a.platform()).collect()
    }
}

/// Builds the registry with every supported platform.
#[must_use]
pub fn build_default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(BossAdapter::new()));
    registry.register(Box::new(Job51Adapter::new()));
    registry.register(Box::new(LiepinAdapter::new()));
    registry.register(Box::new(ZhilianAdapter::new()));
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_platforms() {
        let registry = build_default_registry();
        for platform in Platform::all() {
            let adapter = registry.get(platform).unwrap();
            assert_eq!(adapter.platform(), platform);
        }
    }

    #[test]
    fn test_registry_order_matches_platform_order() {
        let registry = build_default_registry();
        assert_eq!(registry.platforms(), Platform::all().to_vec());
    }

    #[test]
    fn test_empty_registry_returns_none() {
        let registry = AdapterRegistry::new();
        assert!(registry.get(Platform::Boss).is_none());
    }

    #[test]
    fn test_paging_mode_labels() {
        assert_eq!(PagingMode::Scroll.as_str(), "scroll");
        assert_eq!(PagingMode::Paged.as_str(), "paged");
    }

    #[test]
    fn test_login_plans_are_consistent() {
        let registry = build_default_registry();
        for platform in Platform::all() {
            let adapter = registry.get(platform).unwrap();
            let plan = adapter.login_plan();
            assert_eq!(plan.platform, platform);
            assert!(plan.home_url.contains(adapter.domain_fragment()));
            assert!(!plan.required_cookies.is_empty());
        }
    }

    #[test]
    fn test_benign_urls_stay_on_platform_domain() {
        let registry = build_default_registry();
        for platform in Platform::all() {
            let adapter = registry.get(platform).unwrap();
            assert!(adapter.benign_url().contains(adapter.domain_fragment()));
        }
    }
}
