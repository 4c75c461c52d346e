//! Per-run delivery configuration.
//!
//! Loaded from the persistence gateway at run start and treated as
//! immutable for the whole run. All fields have serde defaults so a
//! stored payload from an older version still deserializes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Expected monthly salary range, in thousands of yuan ("K").
///
/// `max_k` is optional: a `15..` expectation only rejects jobs whose
/// upper bound falls below 15K.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryExpectation {
    /// Lower bound in K/month.
    pub min_k: i64,
    /// Optional upper bound in K/month.
    #[serde(default)]
    pub max_k: Option<i64>,
}

/// Optional search facets passed through to the platform's search URL.
///
/// Every field is independently optional; an empty list means the facet
/// is omitted from the URL entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Industry codes.
    #[serde(default)]
    pub industry: Vec<String>,
    /// Experience-bracket codes.
    #[serde(default)]
    pub experience: Vec<String>,
    /// Degree codes.
    #[serde(default)]
    pub degree: Vec<String>,
    /// Company-scale codes.
    #[serde(default)]
    pub scale: Vec<String>,
    /// Funding-stage codes.
    #[serde(default)]
    pub stage: Vec<String>,
    /// Platform salary-bracket code (distinct from [`SalaryExpectation`],
    /// which filters after collection).
    #[serde(default)]
    pub salary_code: Option<String>,
    /// Job-type code (full-time, part-time).
    #[serde(default)]
    pub job_type: Option<String>,
}

/// Timing knobs for human-pacing and bounded waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingSettings {
    /// Fixed delay between consecutive job deliveries, seconds.
    #[serde(default = "default_inter_job_delay_secs")]
    pub inter_job_delay_secs: u64,
    /// Settle delay between scroll iterations during collection, millis.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    /// Ceiling for bounded element waits, seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Base pause between reading-simulation scrolls on a detail page,
    /// millis. Jitter is layered on top.
    #[serde(default = "default_humanize_pause_ms")]
    pub humanize_pause_ms: u64,
}

fn default_inter_job_delay_secs() -> u64 {
    5
}

fn default_scroll_settle_ms() -> u64 {
    2000
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_humanize_pause_ms() -> u64 {
    900
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            inter_job_delay_secs: default_inter_job_delay_secs(),
            scroll_settle_ms: default_scroll_settle_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            humanize_pause_ms: default_humanize_pause_ms(),
        }
    }
}

/// Immutable configuration for a collection-and-delivery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// City codes or names to search, outer loop of collection.
    #[serde(default)]
    pub cities: Vec<String>,
    /// Search keywords, inner loop of collection.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Search facets forwarded to the platform URL.
    #[serde(default)]
    pub filters: SearchFilters,
    /// Expected salary range; `None` disables the salary rule entirely.
    #[serde(default)]
    pub expected_salary: Option<SalaryExpectation>,
    /// Greeting template sent on delivery. Newlines are stripped before
    /// filling because message inputs treat Enter as send.
    #[serde(default)]
    pub greeting: String,
    /// Prefer an AI-generated greeting over the template when a greeting
    /// service is wired in.
    #[serde(default)]
    pub enable_ai_greeting: bool,
    /// Recruiter activity statuses treated as dead ("半年前活跃").
    #[serde(default = "default_dead_hr_statuses")]
    pub dead_hr_statuses: Vec<String>,
    /// Resume image attached after the greeting when the file exists.
    #[serde(default)]
    pub resume_image_path: Option<PathBuf>,
    /// One-paragraph resume summary handed to the greeting service.
    #[serde(default)]
    pub resume_summary: Option<String>,
    /// Upper bound on pagination when the platform pages explicitly.
    #[serde(default = "default_max_page")]
    pub max_page: u32,
    /// Timing knobs.
    #[serde(default)]
    pub pacing: PacingSettings,
}

fn default_dead_hr_statuses() -> Vec<String> {
    vec!["半年前活跃".to_string(), "近半年活跃".to_string()]
}

fn default_max_page() -> u32 {
    10
}

impl DeliveryConfig {
    /// Greeting with newlines flattened to spaces, ready for a message
    /// input where Enter triggers send.
    #[must_use]
    pub fn greeting_line(&self) -> String {
        flatten_message(&self.greeting)
    }
}

/// Flattens any message to a single line for inputs where Enter sends.
#[must_use]
pub fn flatten_message(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
