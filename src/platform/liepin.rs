//! 猎聘 adapter: scroll-fed card API, IM-widget delivery.

use serde::Deserialize;
use urlencoding::encode;

use crate::collect::ScrapeError;
use crate::config::SearchFilters;
use crate::record::{JobRecord, Platform};
use crate::session::{LoginPlan, ProbeSelectors};

use super::{CollectSelectors, DeliverSelectors, PagingMode, PlatformAdapter};

const HOME_URL: &str = "https://www.liepin.com/";
const LOGIN_URL: &str = "https://passport.liepin.com/login";
const BENIGN_URL: &str = "https://www.liepin.com/career/";
const SEARCH_URL: &str = "https://www.liepin.com/zhaopin/";
const LIST_API_MARKER: &str = "api/com.liepin.searchfront4c.pc-search-job";

/// `flag` values other than 1 mean rejection; this code marks the
/// anti-crawl wall specifically.
const ANTI_BOT_CODE: i64 = 10001;

const FLAG_OK: i64 = 1;

mod selectors {
    pub const LOGIN_ENTRY: &str = ".header-quick-menu .login-btn";
    pub const ERROR_MARKER: &str = ".exception-page";
    pub const ERROR_DISMISS: &str = ".exception-page .back-home";
    pub const LOGGED_IN_MARKER: &str = ".header-username";

    pub const LIST_CONTAINER: &str = ".job-list-box";
    pub const JOB_CARD: &str = ".job-card-pc-container";
    pub const NEXT_PAGE: &str = ".list-pagination-box .ant-pagination-next";
    pub const LAST_PAGE_HINT: &str = ".list-pagination-box .ant-pagination-item:nth-last-child(2)";

    pub const LIMIT_DIALOG: &str = ".im-limit-dialog";
    pub const CHAT_BUTTON: &str = ".job-apply-chat";
    pub const MESSAGE_INPUT: &str = ".__im_basic__textarea";
    pub const SEND_BUTTON: &str = ".__im_basic__send-btn";
    pub const RESUME_INPUT: &str = ".__im_basic__toolbar input[type='file']";
}

/// Adapter for 猎聘 (liepin.com).
#[derive(Debug, Default)]
pub struct LiepinAdapter;

impl LiepinAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlatformAdapter for LiepinAdapter {
    fn platform(&self) -> Platform {
        Platform::Liepin
    }

    fn login_plan(&self) -> LoginPlan {
        LoginPlan {
            platform: Platform::Liepin,
            home_url: HOME_URL,
            login_url: LOGIN_URL,
            required_cookies: &["lt_auth"],
            probe: ProbeSelectors {
                login_entry: selectors::LOGIN_ENTRY,
                login_entry_text: "登录",
                error_marker: selectors::ERROR_MARKER,
                error_dismiss: selectors::ERROR_DISMISS,
                logged_in_marker: selectors::LOGGED_IN_MARKER,
            },
            scan_success_marker: selectors::LOGGED_IN_MARKER,
        }
    }

    fn domain_fragment(&self) -> &'static str {
        "liepin.com"
    }

    fn benign_url(&self) -> &'static str {
        BENIGN_URL
    }

    fn anti_bot_code(&self) -> i64 {
        ANTI_BOT_CODE
    }

    fn paging(&self) -> PagingMode {
        PagingMode::Scroll
    }

    fn list_api_marker(&self) -> &'static str {
        LIST_API_MARKER
    }

    fn search_url(
        &self,
        city: &str,
        keyword: &str,
        filters: &SearchFilters,
        _page: usize,
    ) -> String {
        let mut url = format!("{SEARCH_URL}?city={city}&dq={city}&key={}", encode(keyword));
        if let Some(code) = &filters.salary_code {
            url.push_str(&format!("&salary={code}"));
        }
        if !filters.experience.is_empty() {
            url.push_str(&format!("&workYearCode={}", filters.experience.join(",")));
        }
        if !filters.degree.is_empty() {
            url.push_str(&format!("&eduLevel={}", filters.degree.join(",")));
        }
        if !filters.scale.is_empty() {
            url.push_str(&format!("&compScale={}", filters.scale.join(",")));
        }
        if !filters.industry.is_empty() {
            url.push_str(&format!("&industry={}", filters.industry.join(",")));
        }
        if !filters.stage.is_empty() {
            url.push_str(&format!("&compStage={}", filters.stage.join(",")));
        }
        url
    }

    fn collect_selectors(&self) -> CollectSelectors {
        CollectSelectors {
            list_container: selectors::LIST_CONTAINER,
            job_card: selectors::JOB_CARD,
            next_page: selectors::NEXT_PAGE,
            last_page_hint: selectors::LAST_PAGE_HINT,
        }
    }

    fn deliver_selectors(&self) -> DeliverSelectors {
        DeliverSelectors {
            limit_dialog: selectors::LIMIT_DIALOG,
            chat_button: selectors::CHAT_BUTTON,
            message_input: selectors::MESSAGE_INPUT,
            send_button: selectors::SEND_BUTTON,
            resume_input: selectors::RESUME_INPUT,
            error_marker: selectors::ERROR_MARKER,
        }
    }

    fn parse_listing(&self, body: &str) -> Result<Vec<JobRecord>, ScrapeError> {
        let payload: ListPayload = serde_json::from_str(body)?;
        if payload.flag != FLAG_OK {
            return Err(ScrapeError::ApiRejected {
                code: payload.code,
                message: payload.msg,
            });
        }

        let jobs = payload
            .data
            .map(|outer| outer.data.job_card_list)
            .unwrap_or_default()
            .into_iter()
            .filter(|card| !card.job.job_id.is_empty())
            .map(JobCard::into_record)
            .collect();
        Ok(jobs)
    }
}

/// Envelope of the pc-search-job API. The card list sits two `data`
/// levels deep; each card splits job, company and recruiter blocks.
#[derive(Debug, Deserialize)]
struct ListPayload {
    #[serde(default)]
    flag: i64,
    #[serde(default = "default_code")]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<OuterData>,
}

fn default_code() -> i64 {
    -1
}

#[derive(Debug, Default, Deserialize)]
struct OuterData {
    #[serde(default)]
    data: InnerData,
}

#[derive(Debug, Default, Deserialize)]
struct InnerData {
    #[serde(rename = "jobCardList", default)]
    job_card_list: Vec<JobCard>,
}

#[derive(Debug, Default, Deserialize)]
struct JobCard {
    #[serde(default)]
    job: JobBlock,
    #[serde(default)]
    comp: CompBlock,
    #[serde(default)]
    recruiter: RecruiterBlock,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobBlock {
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    salary: String,
    #[serde(default)]
    dq: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    requirement: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompBlock {
    #[serde(default)]
    comp_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecruiterBlock {
    #[serde(default)]
    recruiter_name: String,
    #[serde(default)]
    im_show_text: String,
}

impl JobCard {
    fn into_record(self) -> JobRecord {
        JobRecord {
            title: self.job.title,
            company: self.comp.comp_name,
            salary_text: self.job.salary,
            city: self.job.dq,
            recruiter: self.recruiter.recruiter_name,
            recruiter_status: self.recruiter.im_show_text,
            detail_url: self.job.link,
            description: self.job.requirement,
            ..JobRecord::new(Platform::Liepin, self.job.job_id)
        }
    }
}
