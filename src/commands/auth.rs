//! Auth command handlers: import, inspect and clear stored sessions.
//!
//! Cookies are exported from a real logged-in browser (any extension
//! producing JSON works) and imported here; the pipeline then restores
//! the session without showing the QR code again.

use std::path::Path;

use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

use jobsweep_core::browser::Cookie;
use jobsweep_core::session::{SessionSnapshot, SessionVault};
use jobsweep_core::{Platform, build_default_registry};

use crate::cli::AuthAction;
use crate::commands::read_payload_input;

pub fn run_auth_command(action: &AuthAction) -> Result<()> {
    let vault = SessionVault::open_default()
        .map_err(|error| anyhow!("Cannot open session vault: {error}"))?;

    match action {
        AuthAction::Import { platform, file } => import(&vault, *platform, file.as_deref()),
        AuthAction::Show => show(&vault),
        AuthAction::Clear { platform } => clear(&vault, *platform),
    }
}

fn import(vault: &SessionVault, platform: Platform, file: Option<&Path>) -> Result<()> {
    let raw = read_payload_input(file, "snapshot")?;
    let snapshot = parse_snapshot(platform, &raw)?;

    let registry = build_default_registry();
    if let Some(adapter) = registry.get(platform) {
        let plan = adapter.login_plan();
        let missing: Vec<&str> = plan
            .required_cookies
            .iter()
            .copied()
            .filter(|name| !snapshot.cookies.iter().any(|cookie| cookie.name == *name))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "imported jar lacks cookies required for session restore");
        }
    }

    let path = vault
        .save(&snapshot)
        .map_err(|error| anyhow!("Failed to store session: {error}"))?;
    info!(path = %path.display(), "session snapshot stored");
    println!(
        "Imported {} cookies for {}.",
        snapshot.cookies.len(),
        platform.as_str()
    );
    Ok(())
}

/// Accepts either a full snapshot or a bare cookie array, the shape
/// browser cookie-export extensions produce.
fn parse_snapshot(platform: Platform, raw: &str) -> Result<SessionSnapshot> {
    if let Ok(snapshot) = serde_json::from_str::<SessionSnapshot>(raw) {
        if snapshot.platform != platform {
            bail!(
                "Snapshot belongs to {}, not {}",
                snapshot.platform.as_str(),
                platform.as_str()
            );
        }
        return Ok(snapshot);
    }

    let cookies = serde_json::from_str::<Vec<Cookie>>(raw).map_err(|error| {
        anyhow!("Input is neither a session snapshot nor a cookie array: {error}")
    })?;
    if cookies.is_empty() {
        bail!("Cookie array is empty");
    }
    Ok(SessionSnapshot::new(platform, cookies))
}

fn show(vault: &SessionVault) -> Result<()> {
    let mut stored = 0;
    for platform in Platform::all() {
        match vault.load(platform) {
            Ok(Some(snapshot)) => {
                stored += 1;
                println!(
                    "{}: {} cookies, captured {}",
                    platform.as_str(),
                    snapshot.cookies.len(),
                    snapshot.captured_at.format("%Y-%m-%d %H:%M UTC")
                );
            }
            Ok(None) => {}
            Err(error) => {
                warn!(platform = platform.as_str(), %error, "stored session unreadable");
            }
        }
    }
    if stored == 0 {
        println!("No stored sessions.");
    }
    Ok(())
}

fn clear(vault: &SessionVault, platform: Option<Platform>) -> Result<()> {
    match platform {
        Some(platform) => {
            let removed = vault
                .clear(platform)
                .map_err(|error| anyhow!("Failed to clear session: {error}"))?;
            if removed {
                println!("Cleared session for {}.", platform.as_str());
            } else {
                println!("No stored session for {}.", platform.as_str());
            }
        }
        None => {
            let removed = vault
                .clear_all()
                .map_err(|error| anyhow!("Failed to clear sessions: {error}"))?;
            println!("Cleared {removed} stored sessions.");
        }
    }
    Ok(())
}
