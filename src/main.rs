//! # amber-sync CLI
//!
//! ## Usage
//!
//! ```bash
//! amber-sync --config ./config/amber-sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `amber-sync sync` | Fetch, assemble, and publish the case list |
//! | `amber-sync sync --dry-run` | Assemble and report without writing anything |
//! | `amber-sync status` | Show configured stages and the last artifact |
//! | `amber-sync cases` | List cases from the last artifact |
//!
//! Exit status is 0 when a sync succeeds or finds nothing to publish, and 1
//! when the feed is empty or unreachable or the artifact cannot be written.
//! Intended to run from cron or a systemd timer; runs must not overlap.

use amber_sync::{cases, config, logging, pipeline, sources};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sync a regional missing-children alert feed into a published JSON artifact.
#[derive(Parser)]
#[command(
    name = "amber-sync",
    about = "Sync a regional missing-children alert feed into a published JSON artifact",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/amber-sync.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync.
    ///
    /// Cases already in the artifact are never re-scraped, re-enriched or
    /// re-announced. When nothing changed, nothing is written.
    Sync {
        /// Assemble and report without writing, uploading or notifying.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show which stages are enabled and summarize the last artifact.
    Status,

    /// List cases from the last artifact.
    Cases {
        /// Show at most this many cases.
        #[arg(long)]
        limit: Option<usize>,

        /// Only cases first seen in the most recent sync.
        #[arg(long)]
        new_only: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { dry_run } => {
            pipeline::run_sync(&cfg, dry_run).await?;
        }
        Commands::Status => {
            sources::show_status(&cfg)?;
        }
        Commands::Cases { limit, new_only } => {
            cases::run_cases(&cfg, limit, new_only)?;
        }
    }

    Ok(())
}
