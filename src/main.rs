//! # Bug Squash CLI (`squash`)
//!
//! The `squash` binary runs the competition engine: it initializes the
//! database, ingests merged bug-fix pull requests from GitHub, rebuilds the
//! ranking cache, prints the leaderboard, and serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! squash --config ./config/squash.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `squash init` | Create the SQLite database and run schema migrations |
//! | `squash sync` | Ingest merged bug fixes and rebuild rankings |
//! | `squash rank` | Rebuild the ranking cache from stored contributions |
//! | `squash leaderboard` | Print cached rankings for a timeframe |
//! | `squash serve` | Start the HTTP API and the daily sync schedule |
//! | `squash stats` | Show database counts and ranking coverage |
//!
//! Log verbosity is controlled with `RUST_LOG` (default `info`); logs go to
//! stderr so command output on stdout stays machine-readable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bug_squash::bug_squash_core::models::Timeframe;
use bug_squash::{config, leaderboard, migrate, server, stats, sync};

/// Bug Squash: ingestion and ranking engine for a bug-fixing competition.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/squash.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "squash",
    about = "Bug Squash — ingest merged bug fixes from GitHub and rank contributors",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/squash.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest merged bug-fix pull requests and rebuild rankings.
    Sync,

    /// Rebuild the ranking cache without contacting GitHub.
    Rank,

    /// Print the cached leaderboard.
    Leaderboard {
        /// Ranking window: `day`, `week`, or `all`.
        #[arg(long, default_value = "all")]
        timeframe: Timeframe,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API server.
    Serve,

    /// Show database statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            sync::run_sync(&cfg).await?;
        }
        Commands::Rank => {
            sync::run_rank(&cfg).await?;
        }
        Commands::Leaderboard { timeframe, json } => {
            leaderboard::run_leaderboard(&cfg, timeframe, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
