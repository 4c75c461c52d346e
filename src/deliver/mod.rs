//! Delivery orchestration: one greeting per job, paced and contained.
//!
//! The loop is deliberately sequential. Before each job it checks the
//! stop flag, probes for the platform's daily-limit dialog, then runs
//! the whole per-job flow inside a panic boundary so one poisoned
//! detail page cannot take down the batch. A limit dialog ends the
//! batch early while the call still returns normally with the counts
//! accumulated so far; the untouched jobs simply stay pending.

mod humanize;

pub use humanize::{PageGuard, browse_like_human};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::browser::{BrowserError, BrowserPage};
use crate::cancel::CancelToken;
use crate::config::{DeliveryConfig, flatten_message};
use crate::events::ProgressReporter;
use crate::platform::{DeliverSelectors, PlatformAdapter};
use crate::record::{JobRecord, JobStatus};

/// Bounded wait for the transient daily-limit dialog before each job.
const LIMIT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Random extra on top of the fixed inter-job delay, millis.
const PACING_JITTER_MS: u64 = 500;

/// Errors scoped to a single delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The detail tab could not be opened or was torn down mid-read.
    #[error("detail page unreachable: {url}")]
    DetailUnreachable {
        /// Detail URL of the affected job.
        url: String,
    },

    /// The chat widget never became usable.
    #[error("chat widget unavailable ({selector})")]
    ChatUnavailable {
        /// Selector that was missing or never appeared.
        selector: &'static str,
    },

    /// Neither an AI greeting nor a template produced any text.
    #[error("no greeting text configured")]
    EmptyGreeting,

    /// The daily-limit dialog appeared mid-delivery.
    #[error("daily delivery limit reached")]
    LimitReached,

    /// Browser-level failure inside the tab.
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Optional greeting generator wired in by the embedding application.
#[async_trait]
pub trait AiGreetingService: Send + Sync {
    /// Returns a greeting tailored to the posting, or `None` to fall
    /// back to the configured template.
    async fn generate_greeting(&self, job_description: &str, resume_summary: &str)
    -> Option<String>;
}

/// Outcome counters for one delivery batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    delivered: usize,
    failed: usize,
    limit_hit: bool,
    cancelled: bool,
}

impl DeliveryStats {
    /// Jobs that reached `DeliveredSuccess` in this batch.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Jobs that ended `DeliveredFailed` in this batch.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// True when the daily-limit dialog ended the batch early.
    #[must_use]
    pub fn limit_hit(&self) -> bool {
        self.limit_hit
    }

    /// True when a stop request ended the batch early.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Walks a batch of pending jobs through the delivery state machine.
pub struct DeliveryOrchestrator<'a> {
    adapter: &'a dyn PlatformAdapter,
    events: ProgressReporter,
    ai: Option<Arc<dyn AiGreetingService>>,
}

impl<'a> DeliveryOrchestrator<'a> {
    #[must_use]
    pub fn new(adapter: &'a dyn PlatformAdapter, events: ProgressReporter) -> Self {
        Self {
            adapter,
            events,
            ai: None,
        }
    }

    /// Wires in a greeting service, consulted when the config enables
    /// AI greetings.
    #[must_use]
    pub fn with_ai(mut self, service: Arc<dyn AiGreetingService>) -> Self {
        self.ai = Some(service);
        self
    }

    /// Delivers every pending job in order, mutating each record to its
    /// terminal status. Jobs skipped by cancellation or the daily limit
    /// keep their pending status; a job already in flight when the stop
    /// flag flips completes with its natural outcome.
    #[instrument(skip_all, fields(platform = %self.adapter.platform(), jobs = jobs.len()))]
    pub async fn deliver_jobs(
        &self,
        page: &dyn BrowserPage,
        jobs: &mut [JobRecord],
        config: &DeliveryConfig,
        cancel: &CancelToken,
    ) -> DeliveryStats {
        let mut stats = DeliveryStats::default();
        let selectors = self.adapter.deliver_selectors();
        let total = jobs.len();

        for (index, job) in jobs.iter_mut().enumerate() {
            if job.status != JobStatus::Pending {
                debug!(job_id = %job.job_id, status = %job.status, "skipping non-pending job");
                continue;
            }
            if cancel.is_cancelled() {
                stats.cancelled = true;
                info!(remaining = total - index, "delivery stopped by request");
                self.events.warn("收到停止请求，剩余岗位保持待处理");
                break;
            }
            if page
                .wait_for(selectors.limit_dialog, LIMIT_PROBE_TIMEOUT)
                .await
                .unwrap_or(false)
            {
                stats.limit_hit = true;
                warn!(remaining = total - index, "daily limit dialog present, ending batch");
                self.events.warn("今日投递已达上限，结束本次投递");
                break;
            }

            self.events
                .step(format!("投递 {} · {}", job.company, job.title), index + 1, total);

            let attempt = std::panic::AssertUnwindSafe(
                self.deliver_single(page, job, &selectors, config),
            )
            .catch_unwind()
            .await;

            match attempt {
                Ok(Ok(())) => {
                    job.mark_delivered();
                    stats.delivered += 1;
                    self.events.success(format!("已投递 {}", job.title));
                }
                Ok(Err(DeliveryError::LimitReached)) => {
                    stats.limit_hit = true;
                    warn!(job_id = %job.job_id, "limit dialog during delivery, ending batch");
                    self.events.warn("今日投递已达上限，结束本次投递");
                    break;
                }
                Ok(Err(error)) => {
                    warn!(job_id = %job.job_id, %error, "delivery failed");
                    job.mark_failed(error.to_string());
                    stats.failed += 1;
                    self.events.error(format!("投递失败 {}：{error}", job.title));
                }
                Err(panic) => {
                    let summary = panic_summary(panic.as_ref());
                    warn!(job_id = %job.job_id, panic = %summary, "delivery attempt panicked");
                    job.mark_failed(format!("panic: {summary}"));
                    stats.failed += 1;
                    self.events.error(format!("投递异常中断 {}", job.title));
                }
            }

            if index + 1 < total {
                tokio::time::sleep(pacing_delay(config)).await;
            }
        }

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            limit_hit = stats.limit_hit,
            "delivery batch finished"
        );
        stats
    }

    /// One delivery attempt in an isolated tab. The tab is always
    /// closed, whatever the outcome.
    async fn deliver_single(
        &self,
        page: &dyn BrowserPage,
        job: &JobRecord,
        selectors: &DeliverSelectors,
        config: &DeliveryConfig,
    ) -> Result<(), DeliveryError> {
        let tab = page.open_tab(&job.detail_url).await.map_err(|error| {
            debug!(%error, url = %job.detail_url, "detail tab failed to open");
            DeliveryError::DetailUnreachable {
                url: job.detail_url.clone(),
            }
        })?;

        let result = self.deliver_in_tab(tab.as_ref(), job, selectors, config).await;
        if let Err(error) = tab.close().await {
            debug!(%error, "detail tab close failed");
        }
        result
    }

    async fn deliver_in_tab(
        &self,
        tab: &dyn BrowserPage,
        job: &JobRecord,
        selectors: &DeliverSelectors,
        config: &DeliveryConfig,
    ) -> Result<(), DeliveryError> {
        let guard = PageGuard {
            domain_fragment: self.adapter.domain_fragment(),
            error_marker: selectors.error_marker,
        };
        if !browse_like_human(tab, guard, config.pacing.humanize_pause_ms).await? {
            return Err(DeliveryError::DetailUnreachable {
                url: job.detail_url.clone(),
            });
        }

        tab.click(selectors.chat_button)
            .await
            .map_err(|_| DeliveryError::ChatUnavailable {
                selector: selectors.chat_button,
            })?;

        let wait = Duration::from_secs(config.pacing.wait_timeout_secs);
        if !tab.wait_for(selectors.message_input, wait).await? {
            if tab.is_visible(selectors.limit_dialog).await? {
                return Err(DeliveryError::LimitReached);
            }
            return Err(DeliveryError::ChatUnavailable {
                selector: selectors.message_input,
            });
        }

        let greeting = self.resolve_greeting(job, config).await?;
        tab.fill(selectors.message_input, &greeting).await?;
        self.attach_resume(tab, selectors, config).await;
        tab.click(selectors.send_button).await?;
        debug!(job_id = %job.job_id, "greeting sent");
        Ok(())
    }

    /// AI greeting when enabled and available, template otherwise.
    /// Whatever the source, the text is flattened to one line because
    /// the message inputs treat Enter as send.
    async fn resolve_greeting(
        &self,
        job: &JobRecord,
        config: &DeliveryConfig,
    ) -> Result<String, DeliveryError> {
        if config.enable_ai_greeting {
            if let Some(service) = &self.ai {
                let summary = config.resume_summary.as_deref().unwrap_or_default();
                if let Some(text) = service.generate_greeting(&job.description, summary).await {
                    let line = flatten_message(&text);
                    if !line.is_empty() {
                        return Ok(line);
                    }
                }
                debug!("ai greeting unavailable, falling back to template");
            }
        }

        let line = config.greeting_line();
        if line.is_empty() {
            return Err(DeliveryError::EmptyGreeting);
        }
        Ok(line)
    }

    /// Attaches the resume image when configured and present. Failure
    /// here downgrades to a warning; the greeting already covers the
    /// essential contact.
    async fn attach_resume(
        &self,
        tab: &dyn BrowserPage,
        selectors: &DeliverSelectors,
        config: &DeliveryConfig,
    ) {
        let Some(path) = &config.resume_image_path else {
            return;
        };
        if !path.exists() {
            warn!(path = %path.display(), "resume image missing, skipping attachment");
            return;
        }
        match tab.upload_file(selectors.resume_input, path).await {
            Ok(()) => debug!("resume image attached"),
            Err(error) => {
                warn!(%error, "resume attach failed, sending greeting only");
                self.events.warn("简历图片发送失败，仅发送打招呼语");
            }
        }
    }
}

/// Fixed inter-job delay plus a random jitter, so consecutive
/// deliveries never tick at machine-regular intervals.
fn pacing_delay(config: &DeliveryConfig) -> Duration {
    let base = Duration::from_secs(config.pacing.inter_job_delay_secs);
    if base.is_zero() {
        return Duration::ZERO;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=PACING_JITTER_MS))
}

/// Renders a panic payload for the failure record.
fn panic_summary(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::browser::{PageAction, PageScript, Route, ScriptedPage};
    use crate::platform::BossAdapter;
    use crate::record::Platform;

    use super::*;

    fn pending_job(id: &str) -> JobRecord {
        JobRecord {
            title: format!("岗位{id}"),
            company: "某科技".to_string(),
            detail_url: format!("https://www.zhipin.com/job_detail/{id}.html"),
            ..JobRecord::new(Platform::Boss, id)
        }
    }

    fn fast_config() -> DeliveryConfig {
        let mut config = DeliveryConfig {
            greeting: "您好，想聊聊这个岗位。".to_string(),
            ..DeliveryConfig::default()
        };
        config.pacing.inter_job_delay_secs = 0;
        config.pacing.humanize_pause_ms = 0;
        config.pacing.wait_timeout_secs = 1;
        config
    }

    fn chat_route(id: &str) -> Route {
        let selectors = BossAdapter::new().deliver_selectors();
        Route::matching(format!("job_detail/{id}.html"))
            .element(selectors.chat_button)
            .element(selectors.message_input)
            .element(selectors.send_button)
            .element(selectors.resume_input)
    }

    // ==================== Greeting Tests ====================

    #[tokio::test]
    async fn test_template_greeting_flattened() {
        let adapter = BossAdapter::new();
        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink());
        let mut config = fast_config();
        config.greeting = "您好，\n这是第二行。".to_string();

        let greeting = orchestrator
            .resolve_greeting(&pending_job("a"), &config)
            .await
            .unwrap();
        assert_eq!(greeting, "您好， 这是第二行。");
    }

    #[tokio::test]
    async fn test_empty_greeting_is_an_error() {
        let adapter = BossAdapter::new();
        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink());
        let mut config = fast_config();
        config.greeting = String::new();

        let result = orchestrator.resolve_greeting(&pending_job("a"), &config).await;
        assert!(matches!(result, Err(DeliveryError::EmptyGreeting)));
    }

    struct FixedGreeting(Option<String>);

    #[async_trait]
    impl AiGreetingService for FixedGreeting {
        async fn generate_greeting(&self, _job: &str, _resume: &str) -> Option<String> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_ai_greeting_preferred_when_enabled() {
        let adapter = BossAdapter::new();
        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink())
            .with_ai(Arc::new(FixedGreeting(Some("定制\n招呼".to_string()))));
        let mut config = fast_config();
        config.enable_ai_greeting = true;

        let greeting = orchestrator
            .resolve_greeting(&pending_job("a"), &config)
            .await
            .unwrap();
        assert_eq!(greeting, "定制 招呼");
    }

    #[tokio::test]
    async fn test_ai_none_falls_back_to_template() {
        let adapter = BossAdapter::new();
        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink())
            .with_ai(Arc::new(FixedGreeting(None)));
        let mut config = fast_config();
        config.enable_ai_greeting = true;

        let greeting = orchestrator
            .resolve_greeting(&pending_job("a"), &config)
            .await
            .unwrap();
        assert_eq!(greeting, "您好，想聊聊这个岗位。");
    }

    #[tokio::test]
    async fn test_ai_ignored_when_disabled() {
        let adapter = BossAdapter::new();
        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink())
            .with_ai(Arc::new(FixedGreeting(Some("不该出现".to_string()))));
        let config = fast_config();

        let greeting = orchestrator
            .resolve_greeting(&pending_job("a"), &config)
            .await
            .unwrap();
        assert_eq!(greeting, "您好，想聊聊这个岗位。");
    }

    // ==================== Batch Tests ====================

    #[tokio::test]
    async fn test_happy_path_delivers_all() {
        let adapter = BossAdapter::new();
        let page = ScriptedPage::new(
            PageScript::new()
                .route(chat_route("a"))
                .route(chat_route("b")),
        );
        let mut jobs = vec![pending_job("a"), pending_job("b")];

        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink());
        let stats = orchestrator
            .deliver_jobs(page.as_ref(), &mut jobs, &fast_config(), &CancelToken::new())
            .await;

        assert_eq!(stats.delivered(), 2);
        assert_eq!(stats.failed(), 0);
        assert!(jobs.iter().all(|j| j.status == JobStatus::DeliveredSuccess));

        let fills = page
            .actions()
            .iter()
            .filter(|a| matches!(a, PageAction::Filled(_, text) if text.contains("您好")))
            .count();
        assert_eq!(fills, 2);
    }

    #[tokio::test]
    async fn test_unreachable_detail_fails_job_and_continues() {
        let adapter = BossAdapter::new();
        let page = ScriptedPage::new(
            PageScript::new()
                .route(Route::matching("job_detail/a.html").fail_with("net::ERR_ABORTED"))
                .route(chat_route("b")),
        );
        let mut jobs = vec![pending_job("a"), pending_job("b")];

        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink());
        let stats = orchestrator
            .deliver_jobs(page.as_ref(), &mut jobs, &fast_config(), &CancelToken::new())
            .await;

        assert_eq!(stats.delivered(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(jobs[0].status, JobStatus::DeliveredFailed);
        assert_eq!(jobs[1].status, JobStatus::DeliveredSuccess);
    }

    #[tokio::test]
    async fn test_limit_dialog_on_listing_page_ends_batch_before_first_job() {
        let adapter = BossAdapter::new();
        let selectors = adapter.deliver_selectors();
        let page = ScriptedPage::new(PageScript::new().route(chat_route("a")));
        page.set_visible(selectors.limit_dialog, true);
        let mut jobs = vec![pending_job("a"), pending_job("b")];

        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink());
        let stats = orchestrator
            .deliver_jobs(page.as_ref(), &mut jobs, &fast_config(), &CancelToken::new())
            .await;

        assert!(stats.limit_hit());
        assert_eq!(stats.delivered(), 0);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
        assert!(
            !page
                .actions()
                .iter()
                .any(|a| matches!(a, PageAction::TabOpened(_))),
            "no detail tab may open once the limit dialog is up"
        );
    }

    #[tokio::test]
    async fn test_limit_dialog_in_tab_leaves_job_pending() {
        let adapter = BossAdapter::new();
        let selectors = adapter.deliver_selectors();
        // Chat opens but the input never renders; the limit dialog does.
        let page = ScriptedPage::new(
            PageScript::new().route(
                Route::matching("job_detail/a.html")
                    .element(selectors.chat_button)
                    .element(selectors.limit_dialog),
            ),
        );
        let mut jobs = vec![pending_job("a"), pending_job("b")];

        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink());
        let stats = orchestrator
            .deliver_jobs(page.as_ref(), &mut jobs, &fast_config(), &CancelToken::new())
            .await;

        assert!(stats.limit_hit());
        assert_eq!(stats.delivered(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(jobs[0].status, JobStatus::Pending, "limit is not a job failure");
        assert_eq!(jobs[1].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_panicking_greeting_service_is_contained() {
        struct PanickingService;

        #[async_trait]
        impl AiGreetingService for PanickingService {
            async fn generate_greeting(&self, _job: &str, _resume: &str) -> Option<String> {
                panic!("greeting backend exploded");
            }
        }

        let adapter = BossAdapter::new();
        let page = ScriptedPage::new(
            PageScript::new()
                .route(chat_route("a"))
                .route(chat_route("b")),
        );
        let mut jobs = vec![pending_job("a"), pending_job("b")];
        let mut config = fast_config();
        config.enable_ai_greeting = true;

        let orchestrator = DeliveryOrchestrator::new(&adapter, ProgressReporter::sink())
            .with_ai(Arc::new(PanickingService));
        let stats = orchestrator
            .deliver_jobs(page.as_ref(), &mut jobs, &config, &CancelToken::new())
            .await;

        assert_eq!(stats.delivered(), 0);
        assert_eq!(stats.failed(), 2, "panic is contained per job, batch continues");
        assert!(jobs.iter().all(|j| j.status == JobStatus::DeliveredFailed));
        assert!(jobs[0]
            .filter_reason
            .as_deref()
            .is_some_and(|r| r.contains("panic")));
    }

    #[test]
    fn test_panic_summary_downcasts_common_payloads() {
        assert_eq!(panic_summary(&"boom"), "boom");
        assert_eq!(panic_summary(&"boom".to_string()), "boom");
        assert_eq!(panic_summary(&42_u8), "unknown panic");
    }

    #[test]
    fn test_zero_base_delay_skips_jitter() {
        assert_eq!(pacing_delay(&fast_config()), Duration::ZERO);
    }

    #[test]
    fn test_nonzero_delay_carries_bounded_jitter() {
        let mut config = fast_config();
        config.pacing.inter_job_delay_secs = 2;

        for _ in 0..20 {
            let delay = pacing_delay(&config);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(2) + Duration::from_millis(PACING_JITTER_MS));
        }
    }
}
