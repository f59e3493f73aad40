use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create contributors table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            username TEXT NOT NULL,
            avatar_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create contributions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pr_number INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            contributor_id INTEGER NOT NULL,
            merged_at INTEGER NOT NULL,
            complexity TEXT NOT NULL DEFAULT 'normal',
            points INTEGER NOT NULL CHECK (points >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (contributor_id) REFERENCES contributors(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create rank snapshot cache
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rank_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contributor_id INTEGER NOT NULL,
            timeframe TEXT NOT NULL CHECK (timeframe IN ('day', 'week', 'all')),
            rank INTEGER NOT NULL CHECK (rank >= 1),
            total_bugs INTEGER NOT NULL,
            total_points INTEGER NOT NULL,
            last_updated INTEGER NOT NULL,
            UNIQUE(contributor_id, timeframe),
            FOREIGN KEY (contributor_id) REFERENCES contributors(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contributions_merged_at ON contributions(merged_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contributions_contributor ON contributions(contributor_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rank_snapshots_timeframe ON rank_snapshots(timeframe, rank)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
