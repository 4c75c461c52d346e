//! Jobsweep Core Library
//!
//! This library automates the repetitive half of a job hunt on Chinese
//! recruiting platforms: it keeps a platform session alive, sweeps
//! search listings by intercepting the site's own list API responses,
//! filters the haul through user-defined rules, and greets the
//! recruiters behind whatever survives, one paced message at a time.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`browser`] - Page-driver abstraction and the scripted test double
//! - [`session`] - Login flows, encrypted cookie vault, liveness monitor
//! - [`collect`] - Listing sweeps via response interception
//! - [`filter`] - Pure rule pipeline over collected jobs
//! - [`deliver`] - Greeting delivery with pacing and panic containment
//! - [`pipeline`] - One-platform runs wiring the stages together
//! - [`store`] - SQLite persistence for jobs, blacklists and configs
//! - [`platform`] - Site adapters (Boss直聘, 前程无忧, 猎聘, 智联招聘)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod browser;
pub mod cancel;
pub mod collect;
pub mod config;
pub mod deliver;
pub mod events;
pub mod filter;
pub mod pipeline;
pub mod platform;
pub mod ratelimit;
pub mod record;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use browser::{BrowserError, BrowserPage, Cookie, ScriptedPage};
pub use cancel::CancelToken;
pub use collect::{Collector, ScrapeError};
pub use config::DeliveryConfig;
pub use deliver::{AiGreetingService, DeliveryError, DeliveryOrchestrator, DeliveryStats};
pub use events::{ProgressEvent, ProgressLevel, ProgressReporter};
pub use filter::{FilterContext, FilterOutcome, filter_jobs};
pub use pipeline::{Pipeline, RunError, RunRegistry, RunSummary};
pub use platform::{AdapterRegistry, PlatformAdapter, build_default_registry};
pub use ratelimit::{RefreshPolicy, SensitiveGate};
pub use record::{Blacklist, Cadence, JobRecord, JobStatus, Platform};
pub use session::{LoginMethod, SessionManager, SessionMonitor, SessionVault};
pub use store::{BlacklistKind, PersistenceGateway, SqliteStore, StatusCounts, StoreError};
