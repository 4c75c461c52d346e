//! Login/session lifecycle for a platform page.
//!
//! A run first tries the encrypted stored session: validate, inject,
//! reload, probe. Only when that fails does it park the page on the
//! platform's login screen and wait for the user to scan the QR code.
//! Fresh cookies are persisted right after a successful scan.

pub mod probe;
pub mod store;

pub use probe::{LoginState, ProbeSelectors, probe_login_state};
pub use store::{SessionSnapshot, SessionStoreError, SessionVault};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::browser::{BrowserError, BrowserPage, Cookie};
use crate::events::ProgressReporter;
use crate::record::Platform;

/// Interval between scan-login success-marker polls.
pub const SCAN_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Ceiling for the interactive scan-login wait. Hitting it fails the
/// run; scan login is never retried.
pub const SCAN_LOGIN_TIMEOUT: Duration = Duration::from_secs(600);
/// Interval between background monitor probes of the shared page.
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Errors from the login/session flow.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The scan login did not complete within [`SCAN_LOGIN_TIMEOUT`].
    #[error("scan login timed out after {waited_secs}s")]
    ScanLoginTimeout {
        /// How long the poll loop waited before giving up.
        waited_secs: u64,
    },
    /// Browser-side failure during the login flow.
    #[error(transparent)]
    Browser(#[from] BrowserError),
    /// Encrypted session store failure.
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

/// How a login attempt was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    /// Stored cookies were injected and accepted by the platform.
    StoredSession,
    /// The user scanned the QR code interactively.
    ScanLogin,
}

/// Everything the session flow needs to know about one platform.
#[derive(Debug, Clone, Copy)]
pub struct LoginPlan {
    pub platform: Platform,
    /// Page navigated for cookie injection and probing.
    pub home_url: &'static str,
    /// Page showing the QR login screen.
    pub login_url: &'static str,
    /// Cookie names a stored session must contain to be plausible.
    pub required_cookies: &'static [&'static str],
    pub probe: ProbeSelectors,
    /// Marker polled for during scan login.
    pub scan_success_marker: &'static str,
}

/// Filters a stored jar down to cookies still injectable at `now_epoch`
/// (seconds). Returns the usable cookies and a warning per skipped one.
#[must_use]
pub fn usable_cookies(cookies: &[Cookie], now_epoch: i64) -> (Vec<Cookie>, Vec<String>) {
    let mut valid = Vec::new();
    let mut warnings = Vec::new();

    for cookie in cookies {
        if cookie.name.trim().is_empty() {
            warnings.push("skipped cookie with empty name".to_string());
            continue;
        }
        if cookie.domain.trim().is_empty() {
            warnings.push(format!("skipped cookie '{}' with empty domain", cookie.name));
            continue;
        }
        if let Some(expires_at) = cookie.expires_at
            && expires_at <= now_epoch
        {
            warnings.push(format!("skipped expired cookie '{}'", cookie.name));
            continue;
        }
        valid.push(cookie.clone());
    }

    (valid, warnings)
}

/// Checks a snapshot is structurally plausible for a platform: at least
/// one usable cookie, and every required cookie name present.
///
/// Returns the injectable set, or the reason the snapshot is unusable.
///
/// # Errors
///
/// Returns a human-readable reason string when the snapshot cannot back
/// a login attempt.
pub fn plausible_cookies(
    snapshot: &SessionSnapshot,
    required: &[&str],
    now_epoch: i64,
) -> Result<Vec<Cookie>, String> {
    let (usable, warnings) = usable_cookies(&snapshot.cookies, now_epoch);
    for warning in &warnings {
        debug!(warning, "session cookie skipped");
    }

    if usable.is_empty() {
        return Err("no usable cookies in stored session".to_string());
    }
    for name in required {
        if !usable.iter().any(|cookie| cookie.name == *name) {
            return Err(format!("stored session missing required cookie '{name}'"));
        }
    }
    Ok(usable)
}

/// Drives login for platform pages backed by a [`SessionVault`].
pub struct SessionManager {
    vault: SessionVault,
}

impl SessionManager {
    #[must_use]
    pub fn new(vault: SessionVault) -> Self {
        Self { vault }
    }

    /// Ensures `page` is logged in per `plan`.
    ///
    /// An unreadable or implausible stored session falls back to the
    /// scan login rather than failing the run.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ScanLoginTimeout`] when the QR code is
    /// not scanned in time, or a browser/store error from the flow.
    #[instrument(skip_all, fields(platform = %plan.platform))]
    pub async fn ensure_login(
        &self,
        page: &dyn BrowserPage,
        plan: &LoginPlan,
        events: &ProgressReporter,
    ) -> Result<LoginMethod, SessionError> {
        let stored = match self.vault.load(plan.platform) {
            Ok(stored) => stored,
            Err(error) => {
                warn!(%error, "stored session unreadable, falling back to scan login");
                None
            }
        };

        if let Some(snapshot) = stored {
            match plausible_cookies(&snapshot, plan.required_cookies, Utc::now().timestamp()) {
                Ok(cookies) => {
                    page.navigate(plan.home_url).await?;
                    page.set_cookies(&cookies).await?;
                    page.reload().await?;

                    let state = probe_login_state(page, &plan.probe).await;
                    debug!(%state, "login probe after cookie injection");
                    if !state.needs_login() {
                        info!("session restored from stored cookies");
                        events.success("已恢复上次的登录会话");
                        return Ok(LoginMethod::StoredSession);
                    }
                    warn!(%state, "stored session rejected by platform");
                }
                Err(reason) => {
                    warn!(reason, "stored session not plausible");
                }
            }
        }

        self.scan_login(page, plan, events).await
    }

    /// Parks the page on the login screen and polls every
    /// [`SCAN_POLL_INTERVAL`] for the success marker, bounded by
    /// [`SCAN_LOGIN_TIMEOUT`]. Persists cookies on success.
    async fn scan_login(
        &self,
        page: &dyn BrowserPage,
        plan: &LoginPlan,
        events: &ProgressReporter,
    ) -> Result<LoginMethod, SessionError> {
        page.navigate(plan.login_url).await?;
        events.info("请使用手机App扫码登录");
        info!("waiting for scan login");

        let started = tokio::time::Instant::now();
        loop {
            if page.is_visible(plan.scan_success_marker).await? {
                break;
            }
            if started.elapsed() >= SCAN_LOGIN_TIMEOUT {
                return Err(SessionError::ScanLoginTimeout {
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }

        let cookies = page.cookies().await?;
        let path = self
            .vault
            .save(&SessionSnapshot::new(plan.platform, cookies))?;
        debug!(path = %path.display(), "session persisted after scan login");
        events.success("扫码登录成功");
        Ok(LoginMethod::ScanLogin)
    }
}

/// Background login watchdog for the shared platform page.
///
/// A delivery run owns the page exclusively; it must pause the monitor
/// first. [`SessionMonitor::pause`] returns a guard so the resume
/// happens even when the run errors out, and pauses nest.
#[derive(Clone)]
pub struct SessionMonitor {
    pause_depth: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
}

impl SessionMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pause_depth: Arc::new(AtomicUsize::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the probe loop. The task warns through `events` when the
    /// shared page drops to logged-out, and exits on [`Self::shutdown`].
    pub fn spawn(
        &self,
        page: Arc<dyn BrowserPage>,
        selectors: ProbeSelectors,
        events: ProgressReporter,
    ) -> tokio::task::JoinHandle<()> {
        let pause_depth = Arc::clone(&self.pause_depth);
        let stop = Arc::clone(&self.stop);
        tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                if pause_depth.load(Ordering::SeqCst) == 0 {
                    let state = probe_login_state(page.as_ref(), &selectors).await;
                    if state == LoginState::LoggedOut {
                        warn!("shared page dropped to logged-out");
                        events.warn("登录状态已失效，下次运行时需要重新扫码");
                    }
                }
                tokio::time::sleep(MONITOR_INTERVAL).await;
            }
        })
    }

    /// Pauses monitoring until the returned guard drops.
    #[must_use = "monitoring resumes when the guard is dropped"]
    pub fn pause(&self) -> MonitorPauseGuard {
        self.pause_depth.fetch_add(1, Ordering::SeqCst);
        MonitorPauseGuard {
            pause_depth: Arc::clone(&self.pause_depth),
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pause_depth.load(Ordering::SeqCst) > 0
    }

    /// Signals the spawned loop to exit after its current iteration.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a [`SessionMonitor`] paused; dropping resumes it.
pub struct MonitorPauseGuard {
    pause_depth: Arc<AtomicUsize>,
}

impl Drop for MonitorPauseGuard {
    fn drop(&mut self) {
        self.pause_depth.fetch_sub(1, Ordering::SeqCst);
    }
}
