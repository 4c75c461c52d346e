//! CLI command handlers.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Result, anyhow, bail};

mod auth;
mod blacklist;
mod config;
mod history;
mod salary;
mod simulate;

pub use auth::run_auth_command;
pub use blacklist::run_blacklist_command;
pub use config::run_config_command;
pub use history::run_history_command;
pub use salary::run_salary_command;
pub use simulate::run_simulate_command;

/// Reads a JSON payload from a file argument, or from piped stdin when
/// no file is given.
fn read_payload_input(file: Option<&Path>, what: &str) -> Result<String> {
    if let Some(path) = file {
        return fs::read_to_string(path)
            .map_err(|error| anyhow!("Cannot read {what} file '{}': {}", path.display(), error));
    }

    if io::stdin().is_terminal() {
        bail!("No {what} file given and stdin is a terminal; pass a file or pipe JSON in");
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    if buffer.trim().is_empty() {
        bail!("No {what} data provided on stdin");
    }
    Ok(buffer)
}
