//! Config command handlers: show and import per-platform delivery
//! configs.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::warn;

use jobsweep_core::{DeliveryConfig, PersistenceGateway, SqliteStore};

use crate::cli::ConfigAction;
use crate::commands::read_payload_input;

pub async fn run_config_command(db_path: &Path, action: &ConfigAction) -> Result<()> {
    let store = SqliteStore::open(db_path).await?;
    let outcome = execute(&store, action).await;
    store.close().await;
    outcome
}

async fn execute(store: &SqliteStore, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { platform } => {
            let Some(config) = store.load_config(*platform).await? else {
                println!(
                    "No config stored for {}. Import one with 'jobsweep config import {} <file>'.",
                    platform.as_str(),
                    platform.as_str()
                );
                return Ok(());
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Import { platform, file } => {
            let raw = read_payload_input(file.as_deref(), "config")?;
            let config: DeliveryConfig = serde_json::from_str(&raw)
                .map_err(|error| anyhow!("Invalid config JSON: {error}"))?;

            if config.cities.is_empty() || config.keywords.is_empty() {
                warn!("config lacks cities or keywords; collection passes will be skipped");
            }
            if config.greeting.trim().is_empty() {
                warn!("config has an empty greeting; deliveries will fail until one is set");
            }

            store.save_config(*platform, &config).await?;
            println!(
                "Saved config for {}: {} cities, {} keywords.",
                platform.as_str(),
                config.cities.len(),
                config.keywords.len()
            );
        }
    }
    Ok(())
}
