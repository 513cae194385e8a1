//! Listing cases from the committed artifact.
//!
//! Backs the `amber-sync cases` command. Reads the artifact the last
//! successful sync wrote; never touches the network.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::logging::sanitize;
use crate::models::{Case, SyncArtifact};
use crate::store;

/// Cases in artifact order, optionally restricted to those first seen in
/// the most recent sync.
pub fn select_cases(artifact: &SyncArtifact, limit: Option<usize>, new_only: bool) -> Vec<&Case> {
    artifact
        .cases
        .iter()
        .filter(|c| !new_only || c.synced_at == artifact.last_sync)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

pub fn run_cases(config: &Config, limit: Option<usize>, new_only: bool) -> Result<()> {
    let Some(artifact) = store::load_previous(&config.output.path) else {
        bail!(
            "no synced artifact at {}; run `amber-sync sync` first",
            config.output.path.display()
        );
    };

    let selected = select_cases(&artifact, limit, new_only);
    if selected.is_empty() {
        println!("No cases.");
        return Ok(());
    }

    println!(
        "{:<10} {:<10} {:<28} {:<4} {:<18} {}",
        "ID", "MISSING", "NAME", "AGE", "CITY", "TYPE"
    );
    for case in &selected {
        let name = case.normalized_name.as_deref().unwrap_or(&case.name);
        println!(
            "{:<10} {:<10} {:<28} {:<4} {:<18} {}",
            sanitize(&case.id),
            case.missing_date.as_deref().map(sanitize).unwrap_or_else(|| "-".into()),
            truncate(&sanitize(name), 28),
            case.age.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            truncate(&sanitize(&case.missing_from.city), 18),
            sanitize(&case.case_type),
        );
    }

    println!();
    println!(
        "{} of {} cases (last sync {})",
        selected.len(),
        artifact.cases.len(),
        artifact.last_sync.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
