//! Tri-state login detection over an ordered list of DOM checks.
//!
//! Replaces the usual try/catch ladder with an explicit walk: each
//! check either concludes (logged in / logged out) or passes to the
//! next one. A check that cannot read the page at all poisons the
//! fallback, so a page we could not inspect reports [`LoginState::Unknown`]
//! instead of the optimistic logged-in default.

use tracing::debug;

use crate::browser::BrowserPage;

/// Outcome of probing a platform page for login state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// A logged-in user marker was found, or every check ran clean and
    /// found no login prompt.
    LoggedIn,
    /// An explicit login entry with login wording is on the page.
    LoggedOut,
    /// The page could not be inspected well enough to tell.
    Unknown,
}

impl LoginState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoggedIn => "logged_in",
            Self::LoggedOut => "logged_out",
            Self::Unknown => "unknown",
        }
    }

    /// Session policy: anything short of a confirmed login goes through
    /// the interactive scan-login flow.
    #[must_use]
    pub fn needs_login(self) -> bool {
        !matches!(self, Self::LoggedIn)
    }
}

impl std::fmt::Display for LoginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Selectors a platform exposes for the probe walk.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSelectors {
    /// Login entry control (button or link).
    pub login_entry: &'static str,
    /// Text the login entry must contain to count as a login prompt.
    pub login_entry_text: &'static str,
    /// Error/403 interstitial marker.
    pub error_marker: &'static str,
    /// Control that dismisses the interstitial.
    pub error_dismiss: &'static str,
    /// Marker only present for a logged-in user (avatar, nickname).
    pub logged_in_marker: &'static str,
}

/// Probes the current page for login state.
///
/// Checks run in order; the first conclusive one wins:
/// 1. a visible login entry whose text contains the login wording
///    concludes logged-out;
/// 2. an error/403 interstitial is clicked through so later checks see
///    the page behind it (never conclusive by itself);
/// 3. a visible logged-in user marker concludes logged-in.
///
/// When no check concludes, the result is logged-in if every check
/// could read the page, [`LoginState::Unknown`] otherwise.
pub async fn probe_login_state(page: &dyn BrowserPage, selectors: &ProbeSelectors) -> LoginState {
    let mut unreadable = false;

    match login_entry_check(page, selectors).await {
        Ok(Some(state)) => return state,
        Ok(None) => {}
        Err(error) => {
            debug!(check = "login_entry", %error, "probe check unreadable");
            unreadable = true;
        }
    }

    if let Err(error) = error_interstitial_check(page, selectors).await {
        debug!(check = "error_interstitial", %error, "probe check unreadable");
        unreadable = true;
    }

    match page.is_visible(selectors.logged_in_marker).await {
        Ok(true) => return LoginState::LoggedIn,
        Ok(false) => {}
        Err(error) => {
            debug!(check = "logged_in_marker", %error, "probe check unreadable");
            unreadable = true;
        }
    }

    if unreadable {
        LoginState::Unknown
    } else {
        LoginState::LoggedIn
    }
}

/// A visible login entry only concludes when it actually carries login
/// wording; bare visibility is too easy to confuse with nav chrome.
async fn login_entry_check(
    page: &dyn BrowserPage,
    selectors: &ProbeSelectors,
) -> Result<Option<LoginState>, crate::browser::BrowserError> {
    if !page.is_visible(selectors.login_entry).await? {
        return Ok(None);
    }
    let text = page.text_of(selectors.login_entry).await?.unwrap_or_default();
    if text.contains(selectors.login_entry_text) {
        return Ok(Some(LoginState::LoggedOut));
    }
    Ok(None)
}

async fn error_interstitial_check(
    page: &dyn BrowserPage,
    selectors: &ProbeSelectors,
) -> Result<(), crate::browser::BrowserError> {
    if page.is_visible(selectors.error_marker).await? {
        debug!(selector = selectors.error_marker, "error interstitial found, clicking through");
        page.click(selectors.error_dismiss).await?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::browser::{PageAction, PageScript, Route, ScriptedPage};

    use super::*;

    const SELECTORS: ProbeSelectors = ProbeSelectors {
        login_entry: ".header-login-btn",
        login_entry_text: "登录",
        error_marker: ".error-content",
        error_dismiss: ".error-content .btn-back",
        logged_in_marker: ".user-nav .nav-figure",
    };

    async fn probe_route(route: Route) -> LoginState {
        let page = ScriptedPage::new(PageScript::new().route(route));
        page.navigate("https://platform.example/home").await.unwrap();
        probe_login_state(page.as_ref(), &SELECTORS).await
    }

    #[tokio::test]
    async fn test_login_entry_with_login_wording_is_logged_out() {
        let route = Route::matching("platform.example")
            .element_text(SELECTORS.login_entry, "立即登录")
            .element(SELECTORS.logged_in_marker);
        assert_eq!(probe_route(route).await, LoginState::LoggedOut);
    }

    #[tokio::test]
    async fn test_entry_without_login_wording_falls_through() {
        let route = Route::matching("platform.example")
            .element_text(SELECTORS.login_entry, "个人中心")
            .element(SELECTORS.logged_in_marker);
        assert_eq!(probe_route(route).await, LoginState::LoggedIn);
    }

    #[tokio::test]
    async fn test_logged_in_marker_concludes_logged_in() {
        let route = Route::matching("platform.example").element(SELECTORS.logged_in_marker);
        assert_eq!(probe_route(route).await, LoginState::LoggedIn);
    }

    #[tokio::test]
    async fn test_bare_page_defaults_to_logged_in() {
        let route = Route::matching("platform.example");
        assert_eq!(probe_route(route).await, LoginState::LoggedIn);
    }

    #[tokio::test]
    async fn test_interstitial_click_through_reveals_user_marker() {
        let script = PageScript::new()
            .route(
                Route::matching("platform.example/home")
                    .element(SELECTORS.error_marker)
                    .element_navigating(SELECTORS.error_dismiss, "https://platform.example/back"),
            )
            .route(Route::matching("platform.example/back").element(SELECTORS.logged_in_marker));
        let page = ScriptedPage::new(script);
        page.navigate("https://platform.example/home").await.unwrap();

        let state = probe_login_state(page.as_ref(), &SELECTORS).await;
        assert_eq!(state, LoginState::LoggedIn);
        assert!(
            page.actions()
                .contains(&PageAction::Clicked(SELECTORS.error_dismiss.to_string()))
        );
    }

    #[tokio::test]
    async fn test_interstitial_without_dismiss_control_is_unknown() {
        // Click-through target missing: the check cannot run, so the
        // optimistic fallback must not apply.
        let route = Route::matching("platform.example").element(SELECTORS.error_marker);
        assert_eq!(probe_route(route).await, LoginState::Unknown);
    }

    #[tokio::test]
    async fn test_closed_page_probes_unknown() {
        let page = ScriptedPage::blank();
        page.close().await.unwrap();
        let state = probe_login_state(page.as_ref(), &SELECTORS).await;
        assert_eq!(state, LoginState::Unknown);
    }

    #[test]
    fn test_needs_login_policy() {
        assert!(!LoginState::LoggedIn.needs_login());
        assert!(LoginState::LoggedOut.needs_login());
        assert!(LoginState::Unknown.needs_login());
    }

    #[test]
    fn test_as_str_labels() {
        assert_eq!(LoginState::LoggedIn.as_str(), "logged_in");
        assert_eq!(LoginState::LoggedOut.as_str(), "logged_out");
        assert_eq!(LoginState::Unknown.as_str(), "unknown");
    }
}
