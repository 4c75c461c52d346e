//! Core job record types and status definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recruiting platform a job was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Boss直聘.
    Boss,
    /// 前程无忧 (51job).
    Job51,
    /// 猎聘.
    Liepin,
    /// 智联招聘.
    Zhilian,
}

impl Platform {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boss => "boss",
            Self::Job51 => "job51",
            Self::Liepin => "liepin",
            Self::Zhilian => "zhilian",
        }
    }

    /// All supported platforms, in registry order.
    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::Boss, Self::Job51, Self::Liepin, Self::Zhilian]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boss" => Ok(Self::Boss),
            "job51" | "51job" => Ok(Self::Job51),
            "liepin" => Ok(Self::Liepin),
            "zhilian" => Ok(Self::Zhilian),
            _ => Err(format!("invalid platform: {s}")),
        }
    }
}

/// Lifecycle status of a collected job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Collected, not yet filtered or delivered.
    Pending,
    /// Rejected by a filter rule; `filter_reason` holds the rule's reason.
    Filtered,
    /// Greeting sent successfully.
    DeliveredSuccess,
    /// Delivery attempted and failed; `filter_reason` holds the cause.
    DeliveredFailed,
}

impl JobStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filtered => "filtered",
            Self::DeliveredSuccess => "delivered_success",
            Self::DeliveredFailed => "delivered_failed",
        }
    }

    /// Terminal statuses never transition again within a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DeliveredSuccess | Self::DeliveredFailed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "filtered" => Ok(Self::Filtered),
            "delivered_success" => Ok(Self::DeliveredSuccess),
            "delivered_failed" => Ok(Self::DeliveredFailed),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// Pay cadence of a normalized salary range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Thousands of yuan per month ("15-25K").
    Monthly,
    /// Yuan per day ("300-500元/天").
    Daily,
}

impl Cadence {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "daily" => Ok(Self::Daily),
            _ => Err(format!("invalid cadence: {s}")),
        }
    }
}

/// A single job posting collected from a platform listing.
///
/// Created by the collector, status-mutated by the filter engine
/// (`Pending` -> `Filtered`) and the delivery orchestrator
/// (`Pending` -> `DeliveredSuccess`/`DeliveredFailed`). Never deleted
/// by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Platform the job was collected from.
    pub platform: Platform,
    /// Platform-scoped unique identifier (often an opaque encrypted token).
    pub job_id: String,
    /// Job title as displayed.
    pub title: String,
    /// Hiring company name.
    pub company: String,
    /// Raw salary text as scraped ("15-25K·13薪", "300-500元/天").
    pub salary_text: String,
    /// Normalized lower bound, set by the filter when parsing succeeds.
    pub salary_min: Option<i64>,
    /// Normalized upper bound, set by the filter when parsing succeeds.
    pub salary_max: Option<i64>,
    /// Cadence of the normalized bounds.
    pub salary_cadence: Option<Cadence>,
    /// City the posting is located in.
    pub city: String,
    /// Recruiter display name.
    pub recruiter: String,
    /// Recruiter activity status text ("刚刚活跃", "本月活跃", ...).
    pub recruiter_status: String,
    /// Absolute URL of the job detail page.
    pub detail_url: String,
    /// Job description text when the listing payload carries one.
    pub description: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Reject reason (filter) or failure cause (delivery).
    pub filter_reason: Option<String>,
    /// When the record was first collected.
    pub created_at: DateTime<Utc>,
    /// When the record last changed status.
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a pending record with empty descriptive fields.
    #[must_use]
    pub fn new(platform: Platform, job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            platform,
            job_id: job_id.into(),
            title: String::new(),
            company: String::new(),
            salary_text: String::new(),
            salary_min: None,
            salary_max: None,
            salary_cadence: None,
            city: String::new(),
            recruiter: String::new(),
            recruiter_status: String::new(),
            detail_url: String::new(),
            description: String::new(),
            status: JobStatus::Pending,
            filter_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the record rejected with the given rule reason.
    pub fn mark_filtered(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Filtered;
        self.filter_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Marks the record delivered.
    pub fn mark_delivered(&mut self) {
        self.status = JobStatus::DeliveredSuccess;
        self.filter_reason = None;
        self.updated_at = Utc::now();
    }

    /// Marks the record failed with the given cause.
    pub fn mark_failed(&mut self, cause: impl Into<String>) {
        self.status = JobStatus::DeliveredFailed;
        self.filter_reason = Some(cause.into());
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JobRecord {{ platform: {}, id: {}, title: {}, status: {} }}",
            self.platform, self.job_id, self.title, self.status
        )
    }
}

/// Substring blacklists applied by the filter engine.
///
/// A job is rejected when any entry is a substring of the corresponding
/// field ("外包" matches "XX外包服务有限公司"). Read-only during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blacklist {
    /// Company-name fragments.
    #[serde(default)]
    pub companies: Vec<String>,
    /// Recruiter-name fragments.
    #[serde(default)]
    pub recruiters: Vec<String>,
    /// Job-title fragments.
    #[serde(default)]
    pub job_titles: Vec<String>,
}

impl Blacklist {
    /// True when no list has any entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty() && self.recruiters.is_empty() && self.job_titles.is_empty()
    }
}
