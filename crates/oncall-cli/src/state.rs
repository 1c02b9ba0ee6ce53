//! Desired-schedule and state files.
//!
//! The desired schedule is YAML written by hand. The state file is JSON
//! written by the CLI: the persisted tree, including server ids, from the
//! last successful pass.

use std::path::Path;

use anyhow::{Context, Result};
use oncall_client::Schedule;

/// Parse and validate a desired schedule.
pub fn load_desired(path: &Path) -> Result<Schedule> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schedule {}", path.display()))?;
    let schedule: Schedule = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse schedule {}", path.display()))?;
    schedule
        .validate()
        .with_context(|| format!("invalid schedule {}", path.display()))?;
    Ok(schedule)
}

/// Load the persisted tree. A missing file means nothing has been created.
pub fn load_state(path: &Path) -> Result<Option<Schedule>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state {}", path.display()))?;
    let schedule = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state {}", path.display()))?;
    Ok(Some(schedule))
}

pub fn save_state(path: &Path, schedule: &Schedule) -> Result<()> {
    let json = serde_json::to_string_pretty(schedule).context("failed to encode state")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("failed to write state {}", path.display()))
}

pub fn remove_state(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("failed to remove state {}", path.display()))?;
    }
    Ok(())
}
