//! 智联招聘 adapter: paged listing API, IM-widget delivery.

use serde::Deserialize;
use urlencoding::encode;

use crate::collect::ScrapeError;
use crate::config::SearchFilters;
use crate::record::{JobRecord, Platform};
use crate::session::{LoginPlan, ProbeSelectors};

use super::{CollectSelectors, DeliverSelectors, PagingMode, PlatformAdapter};

const HOME_URL: &str = "https://www.zhaopin.com/";
const LOGIN_URL: &str = "https://passport.zhaopin.com/login";
const BENIGN_URL: &str = "https://www.zhaopin.com/citymap";
const SEARCH_URL: &str = "https://sou.zhaopin.com/";
const LIST_API_MARKER: &str = "api/soujob";

/// Listing API code returned when the session token tripped the risk
/// engine.
const ANTI_BOT_CODE: i64 = 6001;

const CODE_OK: i64 = 200;

mod selectors {
    pub const LOGIN_ENTRY: &str = ".zp-main-nav .login";
    pub const ERROR_MARKER: &str = ".risk-page";
    pub const ERROR_DISMISS: &str = ".risk-page .return-btn";
    pub const LOGGED_IN_MARKER: &str = ".zp-main-nav .user-avatar";

    pub const LIST_CONTAINER: &str = ".positionlist";
    pub const JOB_CARD: &str = ".positionlist .joblist-box__item";
    pub const NEXT_PAGE: &str = ".soupager__btn--next:not(.soupager__btn--disable)";
    pub const LAST_PAGE_HINT: &str = ".soupager__pager:last-child";

    pub const LIMIT_DIALOG: &str = ".deliver-limit-modal";
    pub const CHAT_BUTTON: &str = ".btn-communicate";
    pub const MESSAGE_INPUT: &str = ".zp-im-input textarea";
    pub const SEND_BUTTON: &str = ".zp-im-send";
    pub const RESUME_INPUT: &str = ".zp-im-toolbar input[type='file']";
}

/// Adapter for 智联招聘 (zhaopin.com).
#[derive(Debug, Default)]
pub struct ZhilianAdapter;

impl ZhilianAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlatformAdapter for ZhilianAdapter {
    fn platform(&self) -> Platform {
        Platform::Zhilian
    }

    fn login_plan(&self) -> LoginPlan {
        LoginPlan {
            platform: Platform::Zhilian,
            home_url: HOME_URL,
            login_url: LOGIN_URL,
            required_cookies: &["at"],
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
        "zhaopin.com"
    }

    fn benign_url(&self) -> &'static str {
        BENIGN_URL
    }

    fn anti_bot_code(&self) -> i64 {
        ANTI_BOT_CODE
    }

    fn paging(&self) -> PagingMode {
        PagingMode::Paged
    }

    fn list_api_marker(&self) -> &'static str {
        LIST_API_MARKER
    }

    fn search_url(
        &self,
        city: &str,
        keyword: &str,
        filters: &SearchFilters,
        page: usize,
    ) -> String {
        let mut url = format!("{SEARCH_URL}?jl={city}&kw={}&p={page}", encode(keyword));
        if let Some(code) = &filters.salary_code {
            url.push_str(&format!("&sl={code}"));
        }
        if !filters.experience.is_empty() {
            url.push_str(&format!("&we={}", filters.experience.join(",")));
        }
        if !filters.degree.is_empty() {
            url.push_str(&format!("&el={}", filters.degree.join(",")));
        }
        if !filters.scale.is_empty() {
            url.push_str(&format!("&cs={}", filters.scale.join(",")));
        }
        if !filters.industry.is_empty() {
            url.push_str(&format!("&in={}", filters.industry.join(",")));
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
        if payload.code != CODE_OK {
            return Err(ScrapeError::ApiRejected {
                code: payload.code,
                message: payload.message,
            });
        }

        let jobs = payload
            .data
            .map(|data| data.list)
            .unwrap_or_default()
            .into_iter()
            .filter(|dto| !dto.number.is_empty())
            .map(JobDto::into_record)
            .collect();
        Ok(jobs)
    }
}

#[derive(Debug, Deserialize)]
struct ListPayload {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<DataBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct DataBlock {
    #[serde(default)]
    list: Vec<JobDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDto {
    /// Position number, the stable job id ("CC123456789").
    number: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    salary_str: String,
    #[serde(default)]
    work_city: String,
    #[serde(default)]
    staff_name: String,
    #[serde(default)]
    staff_online_desc: String,
    #[serde(default)]
    position_url: String,
    #[serde(default)]
    job_summary: String,
}

impl JobDto {
    fn into_record(self) -> JobRecord {
        JobRecord {
            title: self.name,
            company: self.company_name,
            salary_text: self.salary_str,
            city: self.work_city,
            recruiter: self.staff_name,
            recruiter_status: self.staff_online_desc,
            detail_url: self.position_url,
            description: self.job_summary,
            ..JobRecord::new(Platform::Zhilian, self.number)
        }
    }
}
