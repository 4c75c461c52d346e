//! SQLite persistence: collected jobs, blacklist entries, per-platform
//! delivery configs.
//!
//! The pool runs in WAL mode with a busy timeout so the CLI and a
//! background run can read concurrently. Schema lives in `migrations/`
//! and is applied on open. Higher layers depend on the
//! [`PersistenceGateway`] trait, not the concrete store, so tests can
//! substitute an in-memory database.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

use crate::config::DeliveryConfig;
use crate::record::{Blacklist, JobRecord, JobStatus, Platform};

/// Kept low for SQLite since it uses file-level locking.
const MAX_CONNECTIONS: u32 = 5;

/// Connections wait this long before returning SQLITE_BUSY, millis.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Persistence-related errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored config payload did not deserialize.
    #[error("invalid stored config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Which blacklist a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlacklistKind {
    Company,
    Recruiter,
    JobTitle,
}

impl BlacklistKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Recruiter => "recruiter",
            Self::JobTitle => "job_title",
        }
    }
}

impl std::fmt::Display for BlacklistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BlacklistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(Self::Company),
            "recruiter" => Ok(Self::Recruiter),
            "job_title" | "title" => Ok(Self::JobTitle),
            _ => Err(format!("invalid blacklist kind: {s}")),
        }
    }
}

/// Per-status row counts for one platform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub filtered: i64,
    pub delivered: i64,
    pub failed: i64,
}

impl StatusCounts {
    /// Total rows across all statuses.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.pending + self.filtered + self.delivered + self.failed
    }
}

/// Data-access contract for run state and user-managed lists.
///
/// Session cookies are deliberately absent: they live in the encrypted
/// vault, never in the database.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Loads every blacklist entry, grouped by kind.
    async fn load_blacklist(&self) -> Result<Blacklist, StoreError>;

    /// Replaces all blacklist entries with the given lists.
    async fn save_blacklist(&self, blacklist: &Blacklist) -> Result<(), StoreError>;

    /// Adds one entry. Returns `false` when it already existed.
    async fn add_blacklist_entry(
        &self,
        kind: BlacklistKind,
        value: &str,
    ) -> Result<bool, StoreError>;

    /// Removes one entry. Returns `false` when it was not present.
    async fn remove_blacklist_entry(
        &self,
        kind: BlacklistKind,
        value: &str,
    ) -> Result<bool, StoreError>;

    /// Loads the stored delivery config for a platform, if any.
    async fn load_config(&self, platform: Platform) -> Result<Option<DeliveryConfig>, StoreError>;

    /// Stores the delivery config for a platform, replacing any previous.
    async fn save_config(
        &self,
        platform: Platform,
        config: &DeliveryConfig,
    ) -> Result<(), StoreError>;

    /// Inserts or updates one job keyed by `(platform, job_id)`.
    /// `created_at` is preserved on update.
    async fn upsert_job(&self, job: &JobRecord) -> Result<(), StoreError>;

    /// Upserts a batch of jobs in one transaction.
    async fn upsert_jobs(&self, jobs: &[JobRecord]) -> Result<(), StoreError>;

    /// Jobs for a platform in one status, oldest first.
    async fn jobs_by_status(
        &self,
        platform: Platform,
        status: JobStatus,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// All jobs for a platform, oldest first.
    async fn jobs_for_platform(&self, platform: Platform) -> Result<Vec<JobRecord>, StoreError>;

    /// Per-status counts for a platform.
    async fn status_counts(&self, platform: Platform) -> Result<StatusCounts, StoreError>;
}

/// SQLite-backed [`PersistenceGateway`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path`, enables
    /// WAL mode and runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the connection fails, or
    /// [`StoreError::Migration`] if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests. WAL mode is skipped, it provides
    /// no benefit without a file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the connection fails, or
    /// [`StoreError::Migration`] if migrations fail.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Gracefully closes all connections in the pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

const UPSERT_JOB_SQL: &str = r"INSERT INTO jobs (
        platform, job_id, title, company, salary_text,
        salary_min, salary_max, salary_cadence,
        city, recruiter, recruiter_status, detail_url, description,
        status, filter_reason, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (platform, job_id) DO UPDATE SET
        title = excluded.title,
        company = excluded.company,
        salary_text = excluded.salary_text,
        salary_min = excluded.salary_min,
        salary_max = excluded.salary_max,
        salary_cadence = excluded.salary_cadence,
        city = excluded.city,
        recruiter = excluded.recruiter,
        recruiter_status = excluded.recruiter_status,
        detail_url = excluded.detail_url,
        description = excluded.description,
        status = excluded.status,
        filter_reason = excluded.filter_reason,
        updated_at = excluded.updated_at";

const SELECT_JOB_COLUMNS: &str = r"SELECT
        platform, job_id, title, company, salary_text,
        salary_min, salary_max, salary_cadence,
        city, recruiter, recruiter_status, detail_url, description,
        status, filter_reason, created_at, updated_at
    FROM jobs";

/// Builds the bound upsert statement for one record.
fn upsert_statement(
    job: &JobRecord,
) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(UPSERT_JOB_SQL)
        .bind(job.platform.as_str())
        .bind(job.job_id.as_str())
        .bind(job.title.as_str())
        .bind(job.company.as_str())
        .bind(job.salary_text.as_str())
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(job.salary_cadence.map(|c| c.as_str()))
        .bind(job.city.as_str())
        .bind(job.recruiter.as_str())
        .bind(job.recruiter_status.as_str())
        .bind(job.detail_url.as_str())
        .bind(job.description.as_str())
        .bind(job.status.as_str())
        .bind(job.filter_reason.as_deref())
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn load_blacklist(&self) -> Result<Blacklist, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT kind, value FROM blacklist ORDER BY kind, value")
                .fetch_all(&self.pool)
                .await?;

        let mut blacklist = Blacklist::default();
        for (kind, value) in rows {
            match kind.parse::<BlacklistKind>() {
                Ok(BlacklistKind::Company) => blacklist.companies.push(value),
                Ok(BlacklistKind::Recruiter) => blacklist.recruiters.push(value),
                Ok(BlacklistKind::JobTitle) => blacklist.job_titles.push(value),
                // Unreachable under the CHECK constraint.
                Err(_) => {}
            }
        }
        Ok(blacklist)
    }

    async fn save_blacklist(&self, blacklist: &Blacklist) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM blacklist").execute(&mut *tx).await?;

        let lists = [
            (BlacklistKind::Company, &blacklist.companies),
            (BlacklistKind::Recruiter, &blacklist.recruiters),
            (BlacklistKind::JobTitle, &blacklist.job_titles),
        ];
        for (kind, values) in lists {
            for value in values {
                sqlx::query("INSERT OR IGNORE INTO blacklist (kind, value) VALUES (?, ?)")
                    .bind(kind.as_str())
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn add_blacklist_entry(
        &self,
        kind: BlacklistKind,
        value: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT OR IGNORE INTO blacklist (kind, value) VALUES (?, ?)")
            .bind(kind.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_blacklist_entry(
        &self,
        kind: BlacklistKind,
        value: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM blacklist WHERE kind = ? AND value = ?")
            .bind(kind.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_config(&self, platform: Platform) -> Result<Option<DeliveryConfig>, StoreError> {
        let payload: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM configs WHERE platform = ?")
                .bind(platform.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match payload {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_config(
        &self,
        platform: Platform,
        config: &DeliveryConfig,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(config)?;
        sqlx::query(
            r"INSERT INTO configs (platform, payload, updated_at)
              VALUES (?, ?, datetime('now'))
              ON CONFLICT (platform) DO UPDATE SET
                  payload = excluded.payload,
                  updated_at = excluded.updated_at",
        )
        .bind(platform.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_job(&self, job: &JobRecord) -> Result<(), StoreError> {
        upsert_statement(job).execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(jobs = jobs.len()))]
    async fn upsert_jobs(&self, jobs: &[JobRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for job in jobs {
            upsert_statement(job).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn jobs_by_status(
        &self,
        platform: Platform,
        status: JobStatus,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let sql = format!("{SELECT_JOB_COLUMNS} WHERE platform = ? AND status = ? ORDER BY id");
        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(platform.as_str())
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(JobRow::into_record).collect())
    }

    async fn jobs_for_platform(&self, platform: Platform) -> Result<Vec<JobRecord>, StoreError> {
        let sql = format!("{SELECT_JOB_COLUMNS} WHERE platform = ? ORDER BY id");
        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(platform.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(JobRow::into_record).collect())
    }

    async fn status_counts(&self, platform: Platform) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs WHERE platform = ? GROUP BY status")
                .bind(platform.as_str())
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Pending) => counts.pending = count,
                Ok(JobStatus::Filtered) => counts.filtered = count,
                Ok(JobStatus::DeliveredSuccess) => counts.delivered = count,
                Ok(JobStatus::DeliveredFailed) => counts.failed = count,
                // Unreachable under the CHECK constraint.
                Err(_) => {}
            }
        }
        Ok(counts)
    }
}

/// Raw row shape; statuses and timestamps are stored as text.
#[derive(Debug, FromRow)]
struct JobRow {
    platform: String,
    job_id: String,
    title: String,
    company: String,
    salary_text: String,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    salary_cadence: Option<String>,
    city: String,
    recruiter: String,
    recruiter_status: String,
    detail_url: String,
    description: String,
    status: String,
    filter_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    /// The CHECK constraints make the fallbacks unreachable for rows
    /// this store wrote itself.
    fn into_record(self) -> JobRecord {
        JobRecord {
            platform: self.platform.parse().unwrap_or(Platform::Boss),
            job_id: self.job_id,
            title: self.title,
            company: self.company,
            salary_text: self.salary_text,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            salary_cadence: self.salary_cadence.as_deref().and_then(|c| c.parse().ok()),
            city: self.city,
            recruiter: self.recruiter,
            recruiter_status: self.recruiter_status,
            detail_url: self.detail_url,
            description: self.description,
            status: self.status.parse().unwrap_or(JobStatus::Pending),
            filter_reason: self.filter_reason,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
