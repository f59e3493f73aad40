//! SQLite database connection management.
//!
//! Provides a connection pool with WAL mode enabled, so leaderboard reads
//! proceed while a sync is rebuilding the ranking cache. Foreign keys are
//! enforced on every connection. The database file and its parent
//! directories are created automatically if they don't exist.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;

/// Create a connection pool to the configured SQLite database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Create a connection pool to the SQLite database at `db_path`.
///
/// - Creates the database file and parent directories if they don't exist.
/// - Enables WAL journal mode and foreign key enforcement.
/// - Returns a pool with up to 5 connections.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
