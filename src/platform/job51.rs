//! 前程无忧 adapter: paged listing API, chat-based delivery.

use serde::Deserialize;
use urlencoding::encode;

use crate::collect::ScrapeError;
use crate::config::SearchFilters;
use crate::record::{JobRecord, Platform};
use crate::session::{LoginPlan, ProbeSelectors};

use super::{CollectSelectors, DeliverSelectors, PagingMode, PlatformAdapter};

const HOME_URL: &str = "https://www.51job.com/";
const LOGIN_URL: &str = "https://login.51job.com/login.php?lang=c";
const BENIGN_URL: &str = "https://we.51job.com/pc/mine";
const SEARCH_URL: &str = "https://we.51job.com/pc/search";
const LIST_API_MARKER: &str = "api/job/search-pc";

/// Listing API status returned when the request hit the access shield.
const ANTI_BOT_CODE: i64 = 1099;

/// Envelope status that means success.
const STATUS_OK: &str = "1";

mod selectors {
    pub const LOGIN_ENTRY: &str = ".uni-login-entrance";
    pub const ERROR_MARKER: &str = ".error-box";
    pub const ERROR_DISMISS: &str = ".error-box .back-btn";
    pub const LOGGED_IN_MARKER: &str = ".header-user .uname";

    pub const LIST_CONTAINER: &str = ".j_joblist";
    pub const JOB_CARD: &str = ".j_joblist .joblist-item";
    pub const NEXT_PAGE: &str = ".bottom-page .btn-next:not(.disabled)";
    pub const LAST_PAGE_HINT: &str = ".bottom-page .number-list a:last-of-type";

    pub const LIMIT_DIALOG: &str = ".apply-limit-dialog";
    pub const CHAT_BUTTON: &str = ".op_btn_chat";
    pub const MESSAGE_INPUT: &str = "#chatInput";
    pub const SEND_BUTTON: &str = ".chat-send-btn";
    pub const RESUME_INPUT: &str = ".chat-upload input[type='file']";
}

/// Adapter for 前程无忧 (51job.com).
#[derive(Debug, Default)]
pub struct Job51Adapter;

impl Job51Adapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlatformAdapter for Job51Adapter {
    fn platform(&self) -> Platform {
        Platform::Job51
    }

    fn login_plan(&self) -> LoginPlan {
        LoginPlan {
            platform: Platform::Job51,
            home_url: HOME_URL,
            login_url: LOGIN_URL,
            required_cookies: &["51job_across"],
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
        "51job.com"
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
        let mut url = format!(
            "{SEARCH_URL}?jobArea={city}&keyword={}&searchType=2&pageNum={page}",
            encode(keyword)
        );
        if let Some(code) = &filters.salary_code {
            url.push_str(&format!("&salary={code}"));
        }
        if !filters.experience.is_empty() {
            url.push_str(&format!("&workYear={}", filters.experience.join(",")));
        }
        if !filters.degree.is_empty() {
            url.push_str(&format!("&degree={}", filters.degree.join(",")));
        }
        if !filters.scale.is_empty() {
            url.push_str(&format!("&companySize={}", filters.scale.join(",")));
        }
        if !filters.industry.is_empty() {
            url.push_str(&format!("&industry={}", filters.industry.join(",")));
        }
        if let Some(job_type) = &filters.job_type {
            url.push_str(&format!("&jobTerm={job_type}"));
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
        if payload.status != STATUS_OK {
            return Err(ScrapeError::ApiRejected {
                code: payload.status.parse().unwrap_or(-1),
                message: payload.message,
            });
        }

        let jobs = payload
            .resultbody
            .map(|body| body.job.items)
            .unwrap_or_default()
            .into_iter()
            .filter(|dto| !dto.job_id.is_empty())
            .map(JobDto::into_record)
            .collect();
        Ok(jobs)
    }
}

/// Envelope of the search-pc API. `status` is a stringified number,
/// "1" on success.
#[derive(Debug, Deserialize)]
struct ListPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    resultbody: Option<ResultBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultBody {
    #[serde(default)]
    job: JobBlock,
}

#[derive(Debug, Default, Deserialize)]
struct JobBlock {
    #[serde(default)]
    items: Vec<JobDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDto {
    job_id: String,
    #[serde(default)]
    job_name: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    provide_salary_string: String,
    #[serde(default)]
    job_area_string: String,
    #[serde(default)]
    hr_name: String,
    #[serde(default)]
    hr_active_status: String,
    #[serde(default)]
    job_href: String,
    #[serde(default)]
    job_describe: String,
}

impl JobDto {
    fn into_record(self) -> JobRecord {
        JobRecord {
            title: self.job_name,
            company: self.company_name,
            salary_text: self.provide_salary_string,
            city: self.job_area_string,
            recruiter: self.hr_name,
            recruiter_status: self.hr_active_status,
            detail_url: self.job_href,
            description: self.job_describe,
            ..JobRecord::new(Platform::Job51, self.job_id)
        }
    }
}
