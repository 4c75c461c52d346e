//! Salary command handler: normalize a salary text and optionally
//! check it against an expected range.

use anyhow::{Result, bail};

use jobsweep_core::Cadence;
use jobsweep_core::config::SalaryExpectation;
use jobsweep_core::filter::salary::{self, SalaryVerdict};

pub fn run_salary_command(text: &str, min_k: Option<i64>, max_k: Option<i64>) -> Result<()> {
    match salary::normalize(text) {
        Some(parsed) => {
            let unit = match parsed.cadence {
                Cadence::Monthly => "K/month",
                Cadence::Daily => "yuan/day",
            };
            println!("{text}: {}-{} {unit}", parsed.low, parsed.high);
        }
        None => println!("{text}: not a parseable salary range"),
    }

    let expectation = match (min_k, max_k) {
        (Some(min_k), max_k) => SalaryExpectation { min_k, max_k },
        (None, Some(_)) => bail!("--max-k requires --min-k"),
        (None, None) => return Ok(()),
    };

    let verdict = match salary::check(text, &expectation) {
        SalaryVerdict::Within => "within the expected range",
        SalaryVerdict::Mismatch => "outside the expected range",
        SalaryVerdict::Unparseable => "unparseable, so rejected against a configured expectation",
    };
    println!("Against {}: {verdict}", describe_expectation(&expectation));

    Ok(())
}

fn describe_expectation(expectation: &SalaryExpectation) -> String {
    match expectation.max_k {
        Some(max_k) => format!("{}K-{max_k}K", expectation.min_k),
        None => format!("{}K and up", expectation.min_k),
    }
}
