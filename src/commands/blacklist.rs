//! Blacklist command handlers: add, remove and list filter entries.

use std::path::Path;

use anyhow::Result;

use jobsweep_core::{BlacklistKind, PersistenceGateway, SqliteStore};

use crate::cli::BlacklistAction;

pub async fn run_blacklist_command(db_path: &Path, action: &BlacklistAction) -> Result<()> {
    let store = SqliteStore::open(db_path).await?;
    let outcome = execute(&store, action).await;
    store.close().await;
    outcome
}

async fn execute(store: &SqliteStore, action: &BlacklistAction) -> Result<()> {
    match action {
        BlacklistAction::Add { kind, value } => {
            let added = store.add_blacklist_entry(*kind, value).await?;
            if added {
                println!("Added {} entry: {value}", kind.as_str());
            } else {
                println!("{} entry already present: {value}", kind.as_str());
            }
        }
        BlacklistAction::Remove { kind, value } => {
            let removed = store.remove_blacklist_entry(*kind, value).await?;
            if removed {
                println!("Removed {} entry: {value}", kind.as_str());
            } else {
                println!("No {} entry matched: {value}", kind.as_str());
            }
        }
        BlacklistAction::List => {
            let blacklist = store.load_blacklist().await?;
            if blacklist.is_empty() {
                println!("Blacklist is empty.");
                return Ok(());
            }
            print_group(BlacklistKind::Company, &blacklist.companies);
            print_group(BlacklistKind::Recruiter, &blacklist.recruiters);
            print_group(BlacklistKind::JobTitle, &blacklist.job_titles);
        }
    }
    Ok(())
}

fn print_group(kind: BlacklistKind, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    println!("{} ({}):", kind.as_str(), entries.len());
    for entry in entries {
        println!("  {entry}");
    }
}
