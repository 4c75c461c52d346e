//! History command handler: list collected jobs and their statuses.

use std::path::Path;

use anyhow::Result;

use jobsweep_core::{JobRecord, JobStatus, PersistenceGateway, Platform, SqliteStore, StatusCounts};

pub async fn run_history_command(
    db_path: &Path,
    platform: Option<Platform>,
    status: Option<JobStatus>,
) -> Result<()> {
    let store = SqliteStore::open(db_path).await?;
    let outcome = execute(&store, platform, status).await;
    store.close().await;
    outcome
}

async fn execute(
    store: &SqliteStore,
    platform: Option<Platform>,
    status: Option<JobStatus>,
) -> Result<()> {
    let platforms = match platform {
        Some(platform) => vec![platform],
        None => Platform::all().to_vec(),
    };

    let mut jobs = Vec::new();
    for &platform in &platforms {
        let batch = match status {
            Some(status) => store.jobs_by_status(platform, status).await?,
            None => store.jobs_for_platform(platform).await?,
        };
        jobs.extend(batch);
    }

    if jobs.is_empty() {
        if platform.is_some() || status.is_some() {
            println!("No jobs matched the current filters.");
        } else {
            println!("No jobs recorded yet.");
        }
        return Ok(());
    }

    for job in &jobs {
        println!("{}", render_row(job));
    }

    let mut totals = StatusCounts::default();
    for &platform in &platforms {
        let counts = store.status_counts(platform).await?;
        totals.pending += counts.pending;
        totals.filtered += counts.filtered;
        totals.delivered += counts.delivered;
        totals.failed += counts.failed;
    }
    println!(
        "{} shown; totals: {} pending, {} filtered, {} delivered, {} failed",
        jobs.len(),
        totals.pending,
        totals.filtered,
        totals.delivered,
        totals.failed
    );
    Ok(())
}

fn render_row(job: &JobRecord) -> String {
    let mut row = format!(
        "[{:<17}] {:<7} {} · {} · {}",
        job.status.as_str(),
        job.platform.as_str(),
        job.title,
        job.company,
        job.salary_text
    );
    if let Some(reason) = &job.filter_reason {
        row.push_str(&format!(" ({reason})"));
    }
    row
}
