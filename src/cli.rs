//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use jobsweep_core::{BlacklistKind, JobStatus, Platform};

/// Sweep job listings, filter them, and deliver greetings.
///
/// Jobsweep drives a recruiting-platform session end to end: login,
/// listing collection, rule filtering and paced greeting delivery,
/// with every job's outcome recorded in a local SQLite database.
#[derive(Parser, Debug)]
#[command(name = "jobsweep")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the SQLite database
    #[arg(long, default_value = "jobsweep.db", global = true)]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline against a scripted in-memory site
    Simulate {
        /// Platform to simulate (only boss ships a scripted site)
        #[arg(long, default_value = "boss", value_parser = parse_platform)]
        platform: Platform,

        /// Number of jobs the scripted listing serves (1-50)
        #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(1..=50))]
        jobs: u8,

        /// Show the daily-limit dialog after this many deliveries
        #[arg(long)]
        limit_after: Option<u8>,

        /// Record results in the database given by --db instead of an
        /// in-memory one
        #[arg(long)]
        persist: bool,
    },

    /// Parse a salary text and check it against an expected range
    Salary {
        /// Salary text as scraped ("15-25K·13薪", "300-500元/天")
        text: String,

        /// Expected lower bound, K per month
        #[arg(long)]
        min_k: Option<i64>,

        /// Expected upper bound, K per month
        #[arg(long)]
        max_k: Option<i64>,
    },

    /// Manage blacklist entries
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },

    /// Show collected jobs and their statuses
    History {
        /// Restrict to one platform
        #[arg(long, value_parser = parse_platform)]
        platform: Option<Platform>,

        /// Restrict to one status (pending, filtered, delivered_success,
        /// delivered_failed)
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
    },

    /// Manage stored login sessions
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Manage per-platform delivery configs
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum BlacklistAction {
    /// Add an entry
    Add {
        /// Which list (company, recruiter, job_title)
        #[arg(value_parser = parse_kind)]
        kind: BlacklistKind,
        /// Substring to match
        value: String,
    },

    /// Remove an entry
    Remove {
        /// Which list (company, recruiter, job_title)
        #[arg(value_parser = parse_kind)]
        kind: BlacklistKind,
        /// Substring to remove
        value: String,
    },

    /// List all entries
    List,
}

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Import a session snapshot (JSON) from a file or stdin
    Import {
        /// Platform the snapshot belongs to
        #[arg(value_parser = parse_platform)]
        platform: Platform,
        /// Snapshot file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Show which platforms have a stored session
    Show,

    /// Delete stored sessions
    Clear {
        /// Platform to clear; clears every platform when omitted
        #[arg(value_parser = parse_platform)]
        platform: Option<Platform>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the stored config as JSON
    Show {
        /// Platform whose config to print
        #[arg(value_parser = parse_platform)]
        platform: Platform,
    },

    /// Import a config (JSON) from a file or stdin
    Import {
        /// Platform the config applies to
        #[arg(value_parser = parse_platform)]
        platform: Platform,
        /// Config file; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse()
}

fn parse_kind(s: &str) -> Result<BlacklistKind, String> {
    s.parse()
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse()
}
