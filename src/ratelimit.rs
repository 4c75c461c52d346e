//! Spacing and refresh handling for sensitive platform calls.
//!
//! Detail-page visits and chat triggers are the calls platforms watch
//! for automation. [`SensitiveGate`] serializes them behind one mutex
//! and enforces a minimum interval between consecutive calls, measured
//! from the previous call's completion; success and failure both move
//! the clock. [`with_token_refresh`] layers the anti-bot recovery on
//! top: when a call fails with an adapter-declared anti-bot response,
//! a benign-navigation refresh runs and the call is retried exactly
//! once. The retry budget lives in [`RefreshPolicy`]; nothing recurses.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::browser::{BrowserError, BrowserPage};

/// Default minimum spacing between sensitive calls.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Default refresh budget per gated call.
const DEFAULT_MAX_REFRESHES: u32 = 1;

/// Serializes sensitive calls and enforces their minimum spacing.
///
/// Wrap in `Arc` and share across the components of one run. Callers
/// block inside the lock, so two concurrent sensitive calls cannot
/// interleave and the interval is enforced even across components.
#[derive(Debug)]
pub struct SensitiveGate {
    /// Minimum time between consecutive gated calls.
    min_interval: Duration,

    /// Completion time of the last gated call. `None` until the first
    /// call; the first call never waits.
    last_call: Mutex<Option<Instant>>,
}

impl Default for SensitiveGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl SensitiveGate {
    /// Creates a gate with the given minimum interval.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration) -> Self {
        debug!("creating sensitive-call gate");
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Runs `op` under the gate.
    ///
    /// Waits out the remainder of the interval while holding the lock,
    /// runs the operation still holding it, then stamps the completion
    /// time whether the operation succeeded or failed.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval.saturating_sub(elapsed);
                debug!(wait_ms = wait.as_millis(), "spacing sensitive call");
                tokio::time::sleep(wait).await;
            }
        } else {
            debug!("first sensitive call - no delay");
        }

        let result = op().await;
        *last_call = Some(Instant::now());
        result
    }
}

/// Budget for anti-bot token refreshes within one gated call.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    max_refreshes: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_refreshes: DEFAULT_MAX_REFRESHES,
        }
    }
}

impl RefreshPolicy {
    /// Creates a policy with a custom budget; zero refuses every
    /// refresh.
    #[must_use]
    pub fn new(max_refreshes: u32) -> Self {
        Self { max_refreshes }
    }

    /// Decides whether another refresh may run after `refreshes_used`.
    #[must_use]
    pub fn should_refresh(&self, refreshes_used: u32) -> RefreshDecision {
        if refreshes_used < self.max_refreshes {
            RefreshDecision::Refresh {
                attempt: refreshes_used + 1,
            }
        } else {
            RefreshDecision::GiveUp {
                reason: format!("refresh budget of {} exhausted", self.max_refreshes),
            }
        }
    }
}

/// Decision on whether to refresh and retry a failed sensitive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Run the refresh side effect, then retry the call.
    Refresh {
        /// Which refresh this will be (1-indexed).
        attempt: u32,
    },

    /// Surface the failure to the caller.
    GiveUp {
        /// Human-readable reason why no further refresh is attempted.
        reason: String,
    },
}

/// Runs a gated call with bounded anti-bot recovery.
///
/// `is_anti_bot` classifies errors; only anti-bot failures consume the
/// refresh budget, every other error returns immediately. A failure of
/// the refresh side effect itself is terminal. With the default policy
/// the operation runs at most twice.
pub async fn with_token_refresh<T, E, Op, OpFut, Refresh, RefreshFut>(
    gate: &SensitiveGate,
    policy: &RefreshPolicy,
    is_anti_bot: impl Fn(&E) -> bool,
    mut op: Op,
    mut refresh: Refresh,
) -> Result<T, E>
where
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T, E>>,
    Refresh: FnMut() -> RefreshFut,
    RefreshFut: Future<Output = Result<(), E>>,
{
    let mut refreshes_used = 0;
    loop {
        let error = match gate.run(&mut op).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !is_anti_bot(&error) {
            return Err(error);
        }
        match policy.should_refresh(refreshes_used) {
            RefreshDecision::Refresh { attempt } => {
                warn!(attempt, "anti-bot response detected, refreshing before one retry");
                refresh().await?;
                refreshes_used = attempt;
            }
            RefreshDecision::GiveUp { reason } => {
                debug!(%reason, "anti-bot response persists");
                return Err(error);
            }
        }
    }
}

/// Benign-navigation refresh: visit a neutral page and behave like a
/// reader for a moment so the platform re-issues request tokens.
#[instrument(skip(page))]
pub async fn benign_refresh(page: &dyn BrowserPage, benign_url: &str) -> Result<(), BrowserError> {
    page.navigate(benign_url).await?;
    page.scroll_by(400).await?;
    tokio::time::sleep(Duration::from_millis(1200)).await;
    page.scroll_by(-200).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn ok_call(gate: &SensitiveGate) {
        gate.run(|| async { Ok::<(), ()>(()) }).await.unwrap();
    }

    // ==================== Gate Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let gate = SensitiveGate::new(Duration::from_secs(10));
        let started = Instant::now();
        ok_call(&gate).await;
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_full_interval() {
        let gate = SensitiveGate::new(Duration::from_secs(10));
        ok_call(&gate).await;

        let started = Instant::now();
        ok_call(&gate).await;
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_interval() {
        let gate = SensitiveGate::new(Duration::from_secs(10));
        ok_call(&gate).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        let started = Instant::now();
        ok_call(&gate).await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(4));
        assert!(waited < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_call_still_updates_clock() {
        let gate = SensitiveGate::new(Duration::from_secs(10));
        let _: Result<(), &str> = gate.run(|| async { Err("boom") }).await;

        let started = Instant::now();
        ok_call(&gate).await;
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_serialize() {
        let gate = Arc::new(SensitiveGate::new(Duration::from_secs(10)));
        let started = Instant::now();

        let a = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.run(|| async { Ok::<(), ()>(()) }).await }
        });
        let b = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.run(|| async { Ok::<(), ()>(()) }).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    // ==================== Policy Tests ====================

    #[test]
    fn test_policy_allows_one_refresh_by_default() {
        let policy = RefreshPolicy::default();
        assert_eq!(
            policy.should_refresh(0),
            RefreshDecision::Refresh { attempt: 1 }
        );
        assert!(matches!(
            policy.should_refresh(1),
            RefreshDecision::GiveUp { .. }
        ));
    }

    #[test]
    fn test_policy_zero_budget_never_refreshes() {
        let policy = RefreshPolicy::new(0);
        assert!(matches!(
            policy.should_refresh(0),
            RefreshDecision::GiveUp { .. }
        ));
    }

    // ==================== Refresh Flow Tests ====================

    #[derive(Debug, PartialEq)]
    enum CallError {
        AntiBot,
        Other,
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_success_on_retry() {
        let gate = SensitiveGate::new(Duration::from_millis(10));
        let attempts = Arc::new(AtomicU32::new(0));
        let refreshes = Arc::new(AtomicU32::new(0));

        let result = with_token_refresh(
            &gate,
            &RefreshPolicy::default(),
            |e| *e == CallError::AntiBot,
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(CallError::AntiBot)
                    } else {
                        Ok(42)
                    }
                }
            },
            || {
                let refreshes = Arc::clone(&refreshes);
                async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_anti_bot_failure_is_terminal() {
        let gate = SensitiveGate::new(Duration::from_millis(10));
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<i32, CallError> = with_token_refresh(
            &gate,
            &RefreshPolicy::default(),
            |e| *e == CallError::AntiBot,
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::AntiBot)
                }
            },
            || async { Ok(()) },
        )
        .await;

        assert_eq!(result.unwrap_err(), CallError::AntiBot);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_bypass_refresh() {
        let gate = SensitiveGate::new(Duration::from_millis(10));
        let attempts = Arc::new(AtomicU32::new(0));
        let refreshes = Arc::new(AtomicU32::new(0));

        let result: Result<i32, CallError> = with_token_refresh(
            &gate,
            &RefreshPolicy::default(),
            |e| *e == CallError::AntiBot,
            || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::Other)
                }
            },
            || {
                let refreshes = Arc::clone(&refreshes);
                async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), CallError::Other);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_is_terminal() {
        let gate = SensitiveGate::new(Duration::from_millis(10));

        let result: Result<i32, CallError> = with_token_refresh(
            &gate,
            &RefreshPolicy::default(),
            |e| *e == CallError::AntiBot,
            || async { Err(CallError::AntiBot) },
            || async { Err(CallError::Other) },
        )
        .await;

        assert_eq!(result.unwrap_err(), CallError::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn test_benign_refresh_navigates_and_scrolls() {
        use crate::browser::{PageAction, ScriptedPage};

        let page = ScriptedPage::blank();
        benign_refresh(page.as_ref(), "https://www.zhipin.com/web/geek/recommend")
            .await
            .unwrap();

        let actions = page.actions();
        assert!(actions.contains(&PageAction::Navigated(
            "https://www.zhipin.com/web/geek/recommend".to_string()
        )));
        assert!(actions.contains(&PageAction::ScrolledBy(400)));
    }
}
