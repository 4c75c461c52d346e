//! Salary text normalization and expected-range comparison.
//!
//! Listing salary text comes in two supported shapes: monthly thousands
//! ("15-25K", optionally with a bonus suffix like "·13薪") and daily
//! yuan ("300-500元/天"). Anything else ("面议", "1-2万") cannot be
//! compared and is rejected rather than waved through.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SalaryExpectation;
use crate::record::Cadence;

/// Bonus-month suffix ("·13薪") carried by monthly listings.
#[allow(clippy::expect_used)]
static BONUS_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"·\d+薪").expect("bonus suffix regex is valid")
});

/// Everything that is not an ASCII digit.
#[allow(clippy::expect_used)]
static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9]").expect("digit strip regex is valid")
});

/// Average working days per month used to convert monthly expectations
/// to daily bounds.
const WORKING_DAYS_PER_MONTH: f64 = 21.75;

/// A successfully normalized salary range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedSalary {
    /// Lower bound (K for monthly, yuan for daily).
    pub low: i64,
    /// Upper bound (K for monthly, yuan for daily).
    pub high: i64,
    /// Unit the bounds are expressed in.
    pub cadence: Cadence,
}

/// Outcome of comparing a salary text against an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalaryVerdict {
    /// The job's range overlaps the expected range.
    Within,
    /// The ranges do not overlap.
    Mismatch,
    /// The text could not be normalized. Treated as a rejection: an
    /// uncomparable salary must not slip past a configured expectation.
    Unparseable,
}

/// Normalizes raw listing salary text into a numeric range.
///
/// Steps, in order: strip the bonus suffix; require a monthly ("K"/"k")
/// or daily ("元/天") marker; drop the K marker; truncate at the first
/// "·" segment; strip the daily unit, remembering the cadence; split on
/// "-" and parse both sides digits-only. Any failure returns `None`.
#[must_use]
pub fn normalize(text: &str) -> Option<NormalizedSalary> {
    let stripped = BONUS_SUFFIX.replace_all(text, "");

    if !stripped.contains('K') && !stripped.contains('k') && !stripped.contains("元/天") {
        return None;
    }

    let mut cleaned = stripped.replace(['K', 'k'], "");
    if let Some(dot) = cleaned.find('·') {
        cleaned.truncate(dot);
    }
    let cadence = if cleaned.contains("元/天") {
        cleaned = cleaned.replace("元/天", "");
        Cadence::Daily
    } else {
        Cadence::Monthly
    };

    let parts: Vec<&str> = cleaned.split('-').collect();
    if parts.len() != 2 {
        return None;
    }
    let low = parse_digits(parts[0])?;
    let high = parse_digits(parts[1])?;

    Some(NormalizedSalary { low, high, cadence })
}

/// Compares listing salary text against an expected monthly range.
///
/// Daily listings are compared against the expectation converted to
/// daily yuan. Ranges mismatch only when they cannot overlap: the job's
/// upper bound is below the expected minimum, or (when a maximum is
/// configured) the job's lower bound is above it.
#[must_use]
pub fn check(text: &str, expectation: &SalaryExpectation) -> SalaryVerdict {
    let Some(salary) = normalize(text) else {
        return SalaryVerdict::Unparseable;
    };

    let (expected_min, expected_max) = match salary.cadence {
        Cadence::Monthly => (expectation.min_k, expectation.max_k),
        Cadence::Daily => (
            monthly_k_to_daily(expectation.min_k),
            expectation.max_k.map(monthly_k_to_daily),
        ),
    };

    if salary.high < expected_min {
        return SalaryVerdict::Mismatch;
    }
    if let Some(max) = expected_max {
        if salary.low > max {
            return SalaryVerdict::Mismatch;
        }
    }
    SalaryVerdict::Within
}

/// Converts K/month to yuan/day, rounding half up (6K -> 276).
fn monthly_k_to_daily(k: i64) -> i64 {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let daily = (k as f64 * 1000.0 / WORKING_DAYS_PER_MONTH).round() as i64;
    daily
}

fn parse_digits(part: &str) -> Option<i64> {
    NON_DIGITS.replace_all(part, "").parse().ok()
}
