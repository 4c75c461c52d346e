//! Listing collection off intercepted API traffic.
//!
//! The collector never scrapes rendered DOM for job data. It registers a
//! response interceptor for the platform's listing API before the first
//! navigation, then walks the listing (infinite scroll or numbered
//! pages) and folds every captured payload into an id-deduplicated
//! result set. Pass-level failures are absorbed as "no results for this
//! search"; only browser-level failures abort the run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::browser::{BrowserError, BrowserPage, InterceptedResponse};
use crate::cancel::CancelToken;
use crate::config::DeliveryConfig;
use crate::events::ProgressReporter;
use crate::platform::{CollectSelectors, PagingMode, PlatformAdapter};
use crate::ratelimit::{RefreshPolicy, SensitiveGate, benign_refresh, with_token_refresh};
use crate::record::JobRecord;

/// How long to wait for the list container before a pass counts as empty.
const LIST_CONTAINER_TIMEOUT: Duration = Duration::from_secs(8);

/// Consecutive unchanged card counts that end a scroll pass.
const SCROLL_STABLE_ROUNDS: u32 = 2;

/// Errors raised while collecting listings.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The listing container never appeared; the pass has no results.
    #[error("list container {selector} not visible after {waited_secs}s")]
    ListContainerMissing {
        /// Container selector that never showed up.
        selector: &'static str,
        /// How long the bounded wait lasted.
        waited_secs: u64,
    },

    /// The listing API envelope carried a platform error code.
    #[error("listing api rejected the request: code {code} ({message})")]
    ApiRejected {
        /// Platform-specific error code.
        code: i64,
        /// Message from the envelope, often empty.
        message: String,
    },

    /// The listing payload body did not parse.
    #[error("malformed listing payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Browser-level failure. Fatal for the run, not just the pass.
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// One (city, keyword) search combination.
#[derive(Debug, Clone, Copy)]
struct SearchPass<'a> {
    city: &'a str,
    keyword: &'a str,
}

/// Id-deduplicated accumulation across passes and scroll iterations.
///
/// The first record seen for a job id wins; later duplicates from
/// re-delivered payloads are dropped without touching the original.
#[derive(Debug, Default)]
struct Harvest {
    seen: HashSet<String>,
    jobs: Vec<JobRecord>,
}

impl Harvest {
    fn absorb(&mut self, batch: Vec<JobRecord>) -> usize {
        let mut added = 0;
        for job in batch {
            if self.seen.insert(job.job_id.clone()) {
                self.jobs.push(job);
                added += 1;
            } else {
                debug!(job_id = %job.job_id, "duplicate listing entry skipped");
            }
        }
        added
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

/// Intercepted payloads waiting to be parsed.
///
/// Wrapped in a sync mutex so that the anti-bot retry closure can reach
/// it through a shared reference.
type PayloadQueue = Mutex<mpsc::UnboundedReceiver<InterceptedResponse>>;

/// Drives listing collection for one platform adapter.
pub struct Collector<'a> {
    adapter: &'a dyn PlatformAdapter,
    gate: Arc<SensitiveGate>,
    refresh: RefreshPolicy,
    events: ProgressReporter,
}

impl<'a> Collector<'a> {
    /// Creates a collector sharing the run's sensitive-call gate.
    #[must_use]
    pub fn new(
        adapter: &'a dyn PlatformAdapter,
        gate: Arc<SensitiveGate>,
        events: ProgressReporter,
    ) -> Self {
        Self {
            adapter,
            gate,
            refresh: RefreshPolicy::default(),
            events,
        }
    }

    /// Collects job records for every configured (city, keyword) pair.
    ///
    /// The interceptor is registered once, before the first navigation,
    /// so payloads triggered by the initial page load are not lost.
    /// Cancellation is honored between cities, keywords, scroll
    /// iterations and pages; a pass already navigating completes.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Browser`] when the page itself fails.
    /// Every other failure is scoped to its pass and absorbed.
    #[instrument(skip_all, fields(platform = %self.adapter.platform()))]
    pub async fn collect_jobs(
        &self,
        page: &dyn BrowserPage,
        config: &DeliveryConfig,
        cancel: &CancelToken,
    ) -> Result<Vec<JobRecord>, ScrapeError> {
        if config.cities.is_empty() || config.keywords.is_empty() {
            self.events.warn("未配置搜索城市或关键词，跳过采集");
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let marker = self.adapter.list_api_marker();
        page.intercept_responses(Arc::new(move |url| url.contains(marker)), tx)
            .await?;
        let payloads: PayloadQueue = Mutex::new(rx);

        let mut harvest = Harvest::default();
        let total_passes = config.cities.len() * config.keywords.len();
        let mut pass_no = 0;

        'cities: for city in &config.cities {
            if cancel.is_cancelled() {
                break;
            }
            for keyword in &config.keywords {
                if cancel.is_cancelled() {
                    break 'cities;
                }
                pass_no += 1;
                self.events
                    .step(format!("搜索 {city} / {keyword}"), pass_no, total_passes);

                let pass = SearchPass { city, keyword };
                match self
                    .run_pass(page, config, cancel, pass, &payloads, &mut harvest)
                    .await
                {
                    Ok(added) => {
                        debug!(city, keyword, added, "search pass finished");
                    }
                    Err(ScrapeError::Browser(error)) => return Err(error.into()),
                    Err(error) => {
                        warn!(city, keyword, %error, "search pass yielded no results");
                        self.events
                            .warn(format!("搜索 {city}/{keyword} 未获取到结果"));
                    }
                }
            }
        }

        info!(collected = harvest.len(), "collection finished");
        Ok(harvest.jobs)
    }

    /// Runs one (city, keyword) pass: land on page one with anti-bot
    /// recovery, then grow the listing per the adapter's paging mode.
    async fn run_pass(
        &self,
        page: &dyn BrowserPage,
        config: &DeliveryConfig,
        cancel: &CancelToken,
        pass: SearchPass<'_>,
        payloads: &PayloadQueue,
        harvest: &mut Harvest,
    ) -> Result<usize, ScrapeError> {
        let before = harvest.len();
        let url = self
            .adapter
            .search_url(pass.city, pass.keyword, &config.filters, 1);
        let selectors = self.adapter.collect_selectors();

        // If the first payload batch comes back with the adapter's
        // anti-bot code, visit the benign page and retry the navigation
        // exactly once.
        let anti_bot = self.adapter.anti_bot_code();
        let benign = self.adapter.benign_url();
        let first_batch = with_token_refresh(
            &self.gate,
            &self.refresh,
            |error| matches!(error, ScrapeError::ApiRejected { code, .. } if *code == anti_bot),
            || {
                let url = url.as_str();
                async move { self.load_listing(page, url, selectors, payloads).await }
            },
            || async move { benign_refresh(page, benign).await.map_err(ScrapeError::from) },
        )
        .await?;
        harvest.absorb(first_batch);

        match self.adapter.paging() {
            PagingMode::Scroll => {
                self.scroll_pass(page, config, cancel, selectors, payloads, harvest)
                    .await?;
            }
            PagingMode::Paged => {
                self.paged_pass(page, config, cancel, selectors, payloads, harvest)
                    .await?;
            }
        }
        Ok(harvest.len() - before)
    }

    /// Navigates to a listing URL and parses the payloads it triggered.
    async fn load_listing(
        &self,
        page: &dyn BrowserPage,
        url: &str,
        selectors: CollectSelectors,
        payloads: &PayloadQueue,
    ) -> Result<Vec<JobRecord>, ScrapeError> {
        page.navigate(url).await?;
        let appeared = page
            .wait_for(selectors.list_container, LIST_CONTAINER_TIMEOUT)
            .await?;
        if !appeared {
            return Err(ScrapeError::ListContainerMissing {
                selector: selectors.list_container,
                waited_secs: LIST_CONTAINER_TIMEOUT.as_secs(),
            });
        }
        self.parse_pending(payloads)
    }

    /// Scroll mode: scroll to the bottom until the card count is
    /// unchanged for [`SCROLL_STABLE_ROUNDS`] consecutive iterations.
    async fn scroll_pass(
        &self,
        page: &dyn BrowserPage,
        config: &DeliveryConfig,
        cancel: &CancelToken,
        selectors: CollectSelectors,
        payloads: &PayloadQueue,
        harvest: &mut Harvest,
    ) -> Result<(), ScrapeError> {
        let settle = Duration::from_millis(config.pacing.scroll_settle_ms);
        let mut last_count = page.count(selectors.job_card).await?;
        let mut stable_rounds = 0;

        while !cancel.is_cancelled() {
            page.scroll_to_bottom().await?;
            tokio::time::sleep(settle).await;

            harvest.absorb(self.parse_pending(payloads)?);

            let count = page.count(selectors.job_card).await?;
            if count == last_count {
                stable_rounds += 1;
                if stable_rounds >= SCROLL_STABLE_ROUNDS {
                    debug!(count, "card count stable, ending scroll pass");
                    break;
                }
            } else {
                stable_rounds = 0;
                last_count = count;
            }
        }
        Ok(())
    }

    /// Paged mode: follow the next-page control until it disappears,
    /// the page ceiling is reached, or cancellation is requested.
    async fn paged_pass(
        &self,
        page: &dyn BrowserPage,
        config: &DeliveryConfig,
        cancel: &CancelToken,
        selectors: CollectSelectors,
        payloads: &PayloadQueue,
        harvest: &mut Harvest,
    ) -> Result<(), ScrapeError> {
        let max_page = self.read_max_page(page, selectors, config).await;
        let settle = Duration::from_millis(config.pacing.scroll_settle_ms);
        let mut page_no: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                debug!(page_no, "pagination cancelled");
                break;
            }
            if page_no >= max_page {
                debug!(page_no, max_page, "page ceiling reached");
                break;
            }
            if !page.is_visible(selectors.next_page).await? {
                debug!(page_no, "next-page control absent, listing exhausted");
                break;
            }

            page.click(selectors.next_page).await?;
            tokio::time::sleep(settle).await;
            let appeared = page
                .wait_for(selectors.list_container, LIST_CONTAINER_TIMEOUT)
                .await?;
            if !appeared {
                debug!(page_no, "list container missing after page turn");
                break;
            }
            page_no += 1;
            harvest.absorb(self.parse_pending(payloads)?);
        }
        Ok(())
    }

    /// Reads the page ceiling from the last pagination control's text,
    /// falling back to the configured maximum.
    async fn read_max_page(
        &self,
        page: &dyn BrowserPage,
        selectors: CollectSelectors,
        config: &DeliveryConfig,
    ) -> u32 {
        match page.text_of(selectors.last_page_hint).await {
            Ok(Some(text)) => {
                let digits: String = text.chars().filter(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(config.max_page)
            }
            Ok(None) => config.max_page,
            Err(error) => {
                debug!(%error, "pagination hint unreadable, using configured maximum");
                config.max_page
            }
        }
    }

    /// Parses every queued payload. An envelope rejection ends the
    /// batch; an unparseable body is skipped so one stray response does
    /// not discard an otherwise good pass.
    fn parse_pending(&self, payloads: &PayloadQueue) -> Result<Vec<JobRecord>, ScrapeError> {
        let mut records = Vec::new();
        let mut queue = lock_payloads(payloads);
        while let Ok(response) = queue.try_recv() {
            match self.adapter.parse_listing(&response.body) {
                Ok(batch) => records.extend(batch),
                Err(error @ ScrapeError::ApiRejected { .. }) => return Err(error),
                Err(error) => {
                    warn!(url = %response.url, %error, "skipping unparseable listing payload");
                }
            }
        }
        Ok(records)
    }
}

fn lock_payloads(
    payloads: &PayloadQueue,
) -> MutexGuard<'_, mpsc::UnboundedReceiver<InterceptedResponse>> {
    match payloads.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
