//! Job filter pipeline: ordered rules, first match rejects.
//!
//! Filtering is pure: no browser interaction, no persistence. Rules run
//! in a fixed order (title, company, recruiter, salary, HR activity)
//! and the first matching rule decides the record's fate with its fixed
//! reject reason. Running the pipeline twice over the same input yields
//! the same partition.

pub mod salary;

use crate::config::{DeliveryConfig, SalaryExpectation};
use crate::record::{Blacklist, JobRecord};
use salary::SalaryVerdict;

/// Reject reason for a blacklisted job title.
pub const REASON_TITLE_BLACKLISTED: &str = "岗位名称包含黑名单关键词";
/// Reject reason for a blacklisted company name.
pub const REASON_COMPANY_BLACKLISTED: &str = "公司名称包含黑名单关键词";
/// Reject reason for a blacklisted recruiter name.
pub const REASON_RECRUITER_BLACKLISTED: &str = "招聘者包含黑名单关键词";
/// Reject reason for a salary outside (or uncomparable to) the
/// expected range.
pub const REASON_SALARY_MISMATCH: &str = "薪资不符合预期范围";
/// Reject reason prefix for an inactive recruiter; the observed status
/// text is appended.
pub const REASON_DEAD_HR_PREFIX: &str = "HR活跃状态已被过滤-";

/// Everything the rules need, snapshotted per run.
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    /// Substring blacklists.
    pub blacklist: Blacklist,
    /// Expected salary range; `None` disables the salary rule.
    pub expected_salary: Option<SalaryExpectation>,
    /// Recruiter activity statuses treated as dead.
    pub dead_hr_statuses: Vec<String>,
}

impl FilterContext {
    /// Builds a context from the run's blacklist and config.
    #[must_use]
    pub fn new(blacklist: Blacklist, config: &DeliveryConfig) -> Self {
        Self {
            blacklist,
            expected_salary: config.expected_salary,
            dead_hr_statuses: config.dead_hr_statuses.clone(),
        }
    }
}

/// Partition produced by [`filter_jobs`].
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Jobs that passed every rule, still `Pending`.
    pub kept: Vec<JobRecord>,
    /// Jobs rejected by a rule, now `Filtered` with a reason.
    pub rejected: Vec<JobRecord>,
}

/// Runs every job through the rule pipeline.
///
/// Kept jobs stay `Pending`; rejected jobs become `Filtered` with the
/// first matching rule's reason. Salary bounds that normalize cleanly
/// are written back onto the record either way.
#[must_use]
pub fn filter_jobs(jobs: Vec<JobRecord>, ctx: &FilterContext) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for mut job in jobs {
        if let Some(parsed) = salary::normalize(&job.salary_text) {
            job.salary_min = Some(parsed.low);
            job.salary_max = Some(parsed.high);
            job.salary_cadence = Some(parsed.cadence);
        }
        match evaluate(&job, ctx) {
            Some(reason) => {
                job.mark_filtered(reason);
                outcome.rejected.push(job);
            }
            None => outcome.kept.push(job),
        }
    }
    outcome
}

/// Applies the rules in order and returns the first reject reason.
#[must_use]
pub fn evaluate(job: &JobRecord, ctx: &FilterContext) -> Option<String> {
    if hits(&ctx.blacklist.job_titles, &job.title) {
        return Some(REASON_TITLE_BLACKLISTED.to_string());
    }
    if hits(&ctx.blacklist.companies, &job.company) {
        return Some(REASON_COMPANY_BLACKLISTED.to_string());
    }
    if hits(&ctx.blacklist.recruiters, &job.recruiter) {
        return Some(REASON_RECRUITER_BLACKLISTED.to_string());
    }
    if let Some(expectation) = &ctx.expected_salary {
        match salary::check(&job.salary_text, expectation) {
            SalaryVerdict::Within => {}
            SalaryVerdict::Mismatch | SalaryVerdict::Unparseable => {
                return Some(REASON_SALARY_MISMATCH.to_string());
            }
        }
    }
    if ctx
        .dead_hr_statuses
        .iter()
        .any(|dead| !dead.is_empty() && job.recruiter_status.contains(dead.as_str()))
    {
        return Some(format!("{REASON_DEAD_HR_PREFIX}{}", job.recruiter_status));
    }
    None
}

fn hits(fragments: &[String], field: &str) -> bool {
    fragments
        .iter()
        .any(|fragment| !fragment.is_empty() && field.contains(fragment.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::{JobStatus, Platform};
    use chrono::Utc;

    fn job() -> JobRecord {
        JobRecord {
            platform: Platform::Boss,
            job_id: "j1".to_string(),
            title: "Rust后端工程师".to_string(),
            company: "某某科技有限公司".to_string(),
            salary_text: "15-25K".to_string(),
            salary_min: None,
            salary_max: None,
            salary_cadence: None,
            city: "上海".to_string(),
            recruiter: "李先生".to_string(),
            recruiter_status: "刚刚活跃".to_string(),
            detail_url: "https://www.zhipin.com/job_detail/j1.html".to_string(),
            description: String::new(),
            status: JobStatus::Pending,
            filter_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx() -> FilterContext {
        FilterContext {
            blacklist: Blacklist::default(),
            expected_salary: None,
            dead_hr_statuses: vec!["半年前活跃".to_string()],
        }
    }

    // ==================== Rule Tests ====================

    #[test]
    fn test_clean_job_is_kept() {
        let outcome = filter_jobs(vec![job()], &ctx());
        assert_eq!(outcome.kept.len(), 1);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.kept[0].status, JobStatus::Pending);
    }

    #[test]
    fn test_title_blacklist_substring() {
        let mut ctx = ctx();
        ctx.blacklist.job_titles = vec!["外派".to_string()];
        let mut j = job();
        j.title = "Java开发(外派银行)".to_string();

        let outcome = filter_jobs(vec![j], &ctx);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some(REASON_TITLE_BLACKLISTED)
        );
        assert_eq!(outcome.rejected[0].status, JobStatus::Filtered);
    }

    #[test]
    fn test_company_blacklist_substring() {
        let mut ctx = ctx();
        ctx.blacklist.companies = vec!["外包".to_string()];
        let mut j = job();
        j.company = "XX外包服务有限公司".to_string();

        let outcome = filter_jobs(vec![j], &ctx);
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some(REASON_COMPANY_BLACKLISTED)
        );
    }

    #[test]
    fn test_recruiter_blacklist() {
        let mut ctx = ctx();
        ctx.blacklist.recruiters = vec!["猎头".to_string()];
        let mut j = job();
        j.recruiter = "猎头顾问王先生".to_string();

        let outcome = filter_jobs(vec![j], &ctx);
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some(REASON_RECRUITER_BLACKLISTED)
        );
    }

    #[test]
    fn test_first_match_wins_over_later_rules() {
        let mut ctx = ctx();
        ctx.blacklist.job_titles = vec!["销售".to_string()];
        ctx.blacklist.companies = vec!["外包".to_string()];
        let mut j = job();
        j.title = "销售经理".to_string();
        j.company = "XX外包公司".to_string();

        let outcome = filter_jobs(vec![j], &ctx);
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some(REASON_TITLE_BLACKLISTED)
        );
    }

    #[test]
    fn test_salary_mismatch_rejected() {
        let mut ctx = ctx();
        ctx.expected_salary = Some(SalaryExpectation {
            min_k: 30,
            max_k: None,
        });

        let outcome = filter_jobs(vec![job()], &ctx);
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some(REASON_SALARY_MISMATCH)
        );
    }

    #[test]
    fn test_unparseable_salary_rejected_when_expectation_set() {
        let mut ctx = ctx();
        ctx.expected_salary = Some(SalaryExpectation {
            min_k: 10,
            max_k: Some(20),
        });
        let mut j = job();
        j.salary_text = "面议".to_string();

        let outcome = filter_jobs(vec![j], &ctx);
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some(REASON_SALARY_MISMATCH)
        );
    }

    #[test]
    fn test_unparseable_salary_kept_without_expectation() {
        let mut j = job();
        j.salary_text = "面议".to_string();
        let outcome = filter_jobs(vec![j], &ctx());
        assert_eq!(outcome.kept.len(), 1);
    }

    #[test]
    fn test_dead_hr_reason_carries_status() {
        let mut j = job();
        j.recruiter_status = "半年前活跃".to_string();
        let outcome = filter_jobs(vec![j], &ctx());
        assert_eq!(
            outcome.rejected[0].filter_reason.as_deref(),
            Some("HR活跃状态已被过滤-半年前活跃")
        );
    }

    #[test]
    fn test_empty_blacklist_fragment_never_matches() {
        let mut ctx = ctx();
        ctx.blacklist.companies = vec![String::new()];
        let outcome = filter_jobs(vec![job()], &ctx);
        assert_eq!(outcome.kept.len(), 1);
    }

    // ==================== Pipeline Tests ====================

    #[test]
    fn test_salary_bounds_annotated_on_kept_jobs() {
        let outcome = filter_jobs(vec![job()], &ctx());
        let kept = &outcome.kept[0];
        assert_eq!(kept.salary_min, Some(15));
        assert_eq!(kept.salary_max, Some(25));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let mut ctx = ctx();
        ctx.blacklist.companies = vec!["外包".to_string()];
        ctx.expected_salary = Some(SalaryExpectation {
            min_k: 10,
            max_k: Some(30),
        });

        let mut bad = job();
        bad.company = "人力外包集团".to_string();
        let jobs = vec![job(), bad];

        let first = filter_jobs(jobs.clone(), &ctx);
        let second = filter_jobs(jobs, &ctx);
        assert_eq!(first.kept.len(), second.kept.len());
        assert_eq!(first.rejected.len(), second.rejected.len());
        assert_eq!(
            first.rejected[0].filter_reason,
            second.rejected[0].filter_reason
        );
    }

    #[test]
    fn test_partition_preserves_total_count() {
        let mut ctx = ctx();
        ctx.blacklist.job_titles = vec!["测试".to_string()];
        let mut other = job();
        other.title = "测试工程师".to_string();

        let outcome = filter_jobs(vec![job(), other], &ctx);
        assert_eq!(outcome.kept.len() + outcome.rejected.len(), 2);
    }
}
