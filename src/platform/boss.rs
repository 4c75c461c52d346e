//! Boss直聘 adapter: scroll-fed listing API, chat-based delivery.

use serde::Deserialize;
use urlencoding::encode;

use crate::collect::ScrapeError;
use crate::config::SearchFilters;
use crate::record::{JobRecord, Platform};
use crate::session::{LoginPlan, ProbeSelectors};

use super::{CollectSelectors, DeliverSelectors, PagingMode, PlatformAdapter};

const HOME_URL: &str = "https://www.zhipin.com/beijing/";
const LOGIN_URL: &str = "https://www.zhipin.com/web/user/?ka=header-login";
const BENIGN_URL: &str = "https://www.zhipin.com/web/geek/job-recommend";
const SEARCH_URL: &str = "https://www.zhipin.com/web/geek/job";
const DETAIL_URL_PREFIX: &str = "https://www.zhipin.com/job_detail/";
const LIST_API_MARKER: &str = "wapi/zpgeek/search/joblist.json";

/// Listing API code returned when the request token went stale.
const ANTI_BOT_CODE: i64 = 37;

mod selectors {
    pub const LOGIN_ENTRY: &str = ".header-login-btn";
    pub const ERROR_MARKER: &str = ".error-content";
    pub const ERROR_DISMISS: &str = ".error-content .btn-back";
    pub const LOGGED_IN_MARKER: &str = ".user-nav .nav-figure";

    pub const LIST_CONTAINER: &str = ".job-list-container";
    pub const JOB_CARD: &str = ".job-card-wrapper";
    pub const NEXT_PAGE: &str = ".options-pages .ui-icon-arrow-right";
    pub const LAST_PAGE_HINT: &str = ".options-pages a:nth-last-child(2)";

    pub const LIMIT_DIALOG: &str = ".dialog-container .chat-limit-tip";
    pub const CHAT_BUTTON: &str = ".btn-startchat";
    pub const MESSAGE_INPUT: &str = "#chat-input";
    pub const SEND_BUTTON: &str = ".chat-op .btn-send";
    pub const RESUME_INPUT: &str = ".chat-tools input[type='file']";
}

/// Adapter for Boss直聘 (zhipin.com).
#[derive(Debug, Default)]
pub struct BossAdapter;

impl BossAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PlatformAdapter for BossAdapter {
    fn platform(&self) -> Platform {
        Platform::Boss
    }

    fn login_plan(&self) -> LoginPlan {
        LoginPlan {
            platform: Platform::Boss,
            home_url: HOME_URL,
            login_url: LOGIN_URL,
            required_cookies: &["wt2"],
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
        "zhipin.com"
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
        let mut url = format!("{SEARCH_URL}?city={city}&query={}", encode(keyword));
        if let Some(code) = &filters.salary_code {
            url.push_str(&format!("&salary={code}"));
        }
        if !filters.experience.is_empty() {
            url.push_str(&format!("&experience={}", filters.experience.join(",")));
        }
        if !filters.degree.is_empty() {
            url.push_str(&format!("&degree={}", filters.degree.join(",")));
        }
        if !filters.scale.is_empty() {
            url.push_str(&format!("&scale={}", filters.scale.join(",")));
        }
        if !filters.industry.is_empty() {
            url.push_str(&format!("&industry={}", filters.industry.join(",")));
        }
        if !filters.stage.is_empty() {
            url.push_str(&format!("&stage={}", filters.stage.join(",")));
        }
        if let Some(job_type) = &filters.job_type {
            url.push_str(&format!("&jobType={job_type}"));
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
        if payload.code != 0 {
            return Err(ScrapeError::ApiRejected {
                code: payload.code,
                message: payload.message,
            });
        }

        let jobs = payload
            .zp_data
            .map(|data| data.job_list)
            .unwrap_or_default()
            .into_iter()
            .filter(|dto| !dto.encrypt_job_id.is_empty())
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
    #[serde(rename = "zpData")]
    zp_data: Option<ZpData>,
}

#[derive(Debug, Default, Deserialize)]
struct ZpData {
    #[serde(rename = "jobList", default)]
    job_list: Vec<JobDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDto {
    encrypt_job_id: String,
    #[serde(default)]
    job_name: String,
    #[serde(default)]
    brand_name: String,
    #[serde(default)]
    salary_desc: String,
    #[serde(default)]
    city_name: String,
    #[serde(default)]
    boss_name: String,
    #[serde(default)]
    active_time_desc: String,
    #[serde(default)]
    job_summary: String,
}

impl JobDto {
    fn into_record(self) -> JobRecord {
        JobRecord {
            title: self.job_name,
            company: self.brand_name,
            salary_text: self.salary_desc,
            city: self.city_name,
            recruiter: self.boss_name,
            recruiter_status: self.active_time_desc,
            detail_url: format!("{DETAIL_URL_PREFIX}{}.html", self.encrypt_job_id),
            description: self.job_summary,
            ..JobRecord::new(Platform::Boss, self.encrypt_job_id)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LIST_FIXTURE: &str = r#"{
        "code": 0,
        "message": "Success",
        "zpData": {
            "jobList": [
                {
                    "encryptJobId": "1a2b3c4d",
                    "jobName": "Rust开发工程师",
                    "brandName": "某某科技",
                    "salaryDesc": "25-45K·15薪",
                    "cityName": "北京",
                    "bossName": "李先生",
                    "activeTimeDesc": "刚刚活跃",
                    "jobSummary": "负责存储引擎开发"
                },
                {
                    "encryptJobId": "5e6f7a8b",
                    "jobName": "后端工程师",
                    "brandName": "外包服务有限公司",
                    "salaryDesc": "15-25K",
                    "cityName": "北京",
                    "bossName": "王女士",
                    "activeTimeDesc": "半年前活跃"
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_listing_maps_fields() {
        let jobs = BossAdapter::new().parse_listing(LIST_FIXTURE).unwrap();
        assert_eq!(jobs.len(), 2);

        let first = &jobs[0];
        assert_eq!(first.platform, Platform::Boss);
        assert_eq!(first.job_id, "1a2b3c4d");
        assert_eq!(first.title, "Rust开发工程师");
        assert_eq!(first.company, "某某科技");
        assert_eq!(first.salary_text, "25-45K·15薪");
        assert_eq!(first.recruiter, "李先生");
        assert_eq!(first.recruiter_status, "刚刚活跃");
        assert_eq!(
            first.detail_url,
            "https://www.zhipin.com/job_detail/1a2b3c4d.html"
        );
    }

    #[test]
    fn test_parse_listing_defaults_missing_optional_fields() {
        let jobs = BossAdapter::new().parse_listing(LIST_FIXTURE).unwrap();
        assert!(jobs[1].description.is_empty());
    }

    #[test]
    fn test_parse_listing_rejects_anti_bot_code() {
        let body = r#"{"code": 37, "message": "您的访问行为异常", "zpData": null}"#;
        let error = BossAdapter::new().parse_listing(body).unwrap_err();
        match error {
            ScrapeError::ApiRejected { code, message } => {
                assert_eq!(code, ANTI_BOT_CODE);
                assert!(message.contains("异常"));
            }
            other => panic!("expected ApiRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_listing_rejects_malformed_body() {
        let error = BossAdapter::new().parse_listing("<html>denied</html>").unwrap_err();
        assert!(matches!(error, ScrapeError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_listing_skips_jobs_without_id() {
        let body = r#"{"code":0,"zpData":{"jobList":[{"encryptJobId":"","jobName":"ghost"}]}}"#;
        let jobs = BossAdapter::new().parse_listing(body).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_search_url_without_filters() {
        let url = BossAdapter::new().search_url(
            "101010100",
            "rust",
            &SearchFilters::default(),
            1,
        );
        assert_eq!(
            url,
            "https://www.zhipin.com/web/geek/job?city=101010100&query=rust"
        );
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let url =
            BossAdapter::new().search_url("101010100", "存储引擎", &SearchFilters::default(), 1);
        assert!(url.contains("query=%E5%AD%98%E5%82%A8%E5%BC%95%E6%93%8E"));
    }

    #[test]
    fn test_search_url_joins_multi_valued_filters() {
        let filters = SearchFilters {
            experience: vec!["104".to_string(), "105".to_string()],
            degree: vec!["203".to_string()],
            salary_code: Some("405".to_string()),
            ..SearchFilters::default()
        };
        let url = BossAdapter::new().search_url("101010100", "rust", &filters, 1);
        assert!(url.contains("&salary=405"));
        assert!(url.contains("&experience=104,105"));
        assert!(url.contains("&degree=203"));
        assert!(!url.contains("&scale="));
    }

    #[test]
    fn test_adapter_shape() {
        let adapter = BossAdapter::new();
        assert_eq!(adapter.paging(), PagingMode::Scroll);
        assert_eq!(adapter.anti_bot_code(), 37);
        assert!(adapter.list_api_marker().contains("joblist.json"));
        assert_eq!(adapter.login_plan().required_cookies, &["wt2"]);
    }
}
