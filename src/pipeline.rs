//! End-to-end run orchestration for one platform.
//!
//! A run is login, collection, filtering and delivery in sequence,
//! with results persisted after the filter stage and again after
//! delivery so an interrupted run leaves its terminal rows behind.
//! Concurrent runs against different platforms are allowed; a second
//! run against the same platform is rejected up front.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::browser::BrowserPage;
use crate::cancel::CancelToken;
use crate::collect::{Collector, ScrapeError};
use crate::config::DeliveryConfig;
use crate::deliver::{AiGreetingService, DeliveryOrchestrator};
use crate::events::ProgressReporter;
use crate::filter::{FilterContext, filter_jobs};
use crate::platform::{AdapterRegistry, build_default_registry};
use crate::ratelimit::SensitiveGate;
use crate::record::Platform;
use crate::session::{SessionManager, SessionMonitor, SessionVault};
use crate::store::PersistenceGateway;

/// Errors that abort a platform run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Another run against the same platform is still in flight.
    #[error("a run against {platform} is already in flight")]
    AlreadyRunning {
        /// Platform of the rejected run.
        platform: Platform,
    },

    /// No adapter is registered for the requested platform.
    #[error("no adapter registered for {platform}")]
    UnsupportedPlatform {
        /// Platform without an adapter.
        platform: Platform,
    },

    /// Login could not be established.
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),

    /// Collection failed beyond what per-pass absorption covers.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Tracks which platforms currently have a run in flight.
///
/// Clones share the same underlying map, so one registry can serve an
/// engine and its status queries.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    running: Arc<DashMap<Platform, ()>>,
}

impl RunRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the platform for a new run. Returns `None` when a run is
    /// already in flight; the returned guard releases the claim on drop.
    #[must_use]
    pub fn try_begin(&self, platform: Platform) -> Option<RunGuard> {
        if self.running.insert(platform, ()).is_some() {
            return None;
        }
        Some(RunGuard {
            running: Arc::clone(&self.running),
            platform,
        })
    }

    /// True while a run against the platform is in flight.
    #[must_use]
    pub fn is_running(&self, platform: Platform) -> bool {
        self.running.contains_key(&platform)
    }
}

/// Releases a [`RunRegistry`] claim when dropped, on every exit path.
pub struct RunGuard {
    running: Arc<DashMap<Platform, ()>>,
    platform: Platform,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.remove(&self.platform);
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs collected from listings, before filtering.
    pub collected: usize,
    /// Jobs rejected by the filter rules.
    pub filtered: usize,
    /// Jobs delivered successfully.
    pub delivered: usize,
    /// Jobs whose delivery failed.
    pub failed: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "采集 {}，过滤 {}，投递成功 {}，投递失败 {}",
            self.collected, self.filtered, self.delivered, self.failed
        )
    }
}

/// Session, collection, filter and delivery wired together behind one
/// entry point.
pub struct Pipeline {
    adapters: AdapterRegistry,
    runs: RunRegistry,
    session: SessionManager,
    monitor: SessionMonitor,
    gate: Arc<SensitiveGate>,
    events: ProgressReporter,
    ai: Option<Arc<dyn AiGreetingService>>,
}

impl Pipeline {
    /// Builds a pipeline over the default adapter registry.
    #[must_use]
    pub fn new(vault: SessionVault, events: ProgressReporter) -> Self {
        Self {
            adapters: build_default_registry(),
            runs: RunRegistry::new(),
            session: SessionManager::new(vault),
            monitor: SessionMonitor::new(),
            gate: Arc::new(SensitiveGate::default()),
            events,
            ai: None,
        }
    }

    /// Wires in an AI greeting service for delivery.
    #[must_use]
    pub fn with_ai(mut self, service: Arc<dyn AiGreetingService>) -> Self {
        self.ai = Some(service);
        self
    }

    /// Replaces the sensitive-call gate (tests use a zero-interval one).
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<SensitiveGate>) -> Self {
        self.gate = gate;
        self
    }

    /// The session monitor paused for the duration of each run.
    #[must_use]
    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    /// True while a run against the platform is in flight.
    #[must_use]
    pub fn is_running(&self, platform: Platform) -> bool {
        self.runs.is_running(platform)
    }

    /// Runs the full cycle for one platform on the given page.
    ///
    /// Rejected jobs are persisted as soon as the filter settles, kept
    /// jobs once as `Pending` before delivery and once with their
    /// terminal status after, so every collected job ends up queryable
    /// even when delivery is cut short.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::AlreadyRunning`] without touching the page
    /// when the platform is busy; session, scrape and store failures
    /// propagate from their stages.
    #[instrument(skip_all, fields(platform = %platform))]
    pub async fn run(
        &self,
        platform: Platform,
        page: Arc<dyn BrowserPage>,
        store: &dyn PersistenceGateway,
        cancel: &CancelToken,
    ) -> Result<RunSummary, RunError> {
        let Some(adapter) = self.adapters.get(platform) else {
            return Err(RunError::UnsupportedPlatform { platform });
        };
        let Some(_claim) = self.runs.try_begin(platform) else {
            return Err(RunError::AlreadyRunning { platform });
        };
        let _probe_pause = self.monitor.pause();

        let config = match store.load_config(platform).await? {
            Some(config) => config,
            None => {
                self.events.warn("未找到平台配置，使用默认配置");
                DeliveryConfig::default()
            }
        };

        self.events.info(format!("开始 {platform} 平台任务"));
        let plan = adapter.login_plan();
        let method = self
            .session
            .ensure_login(page.as_ref(), &plan, &self.events)
            .await?;
        debug!(?method, "session established");

        let collector = Collector::new(adapter, Arc::clone(&self.gate), self.events.clone());
        let collected = collector.collect_jobs(page.as_ref(), &config, cancel).await?;
        self.events.info(format!("采集到 {} 个岗位", collected.len()));

        let blacklist = store.load_blacklist().await?;
        let ctx = FilterContext::new(blacklist, &config);
        let outcome = filter_jobs(collected, &ctx);
        let collected_total = outcome.kept.len() + outcome.rejected.len();
        store.upsert_jobs(&outcome.rejected).await?;

        let mut kept = outcome.kept;
        store.upsert_jobs(&kept).await?;

        let mut orchestrator = DeliveryOrchestrator::new(adapter, self.events.clone());
        if let Some(service) = &self.ai {
            orchestrator = orchestrator.with_ai(Arc::clone(service));
        }
        let stats = orchestrator
            .deliver_jobs(page.as_ref(), &mut kept, &config, cancel)
            .await;
        store.upsert_jobs(&kept).await?;

        let summary = RunSummary {
            collected: collected_total,
            filtered: outcome.rejected.len(),
            delivered: stats.delivered(),
            failed: stats.failed(),
        };
        self.events.success(format!("本次运行：{summary}"));
        info!(%summary, "run finished");
        Ok(summary)
    }
}
