//! Leaderboard query facade.
//!
//! Reads the ranking cache for a timeframe and shapes it for display. This
//! is the only read path used by the HTTP API and the `squash leaderboard`
//! command; it never recomputes rankings.

use anyhow::Result;
use serde::Serialize;

use bug_squash_core::models::Timeframe;
use bug_squash_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Avatar shown for contributors without one.
pub const PLACEHOLDER_AVATAR: &str = "/placeholder.svg?height=40&width=40";

/// One display row of the leaderboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub name: String,
    pub avatar: String,
    pub bugs: i64,
    pub points: i64,
}

/// Return the ranked rows for `timeframe`, best rank first.
///
/// Storage failures are logged and yield an empty list, so callers always
/// have something to render.
pub async fn get_leaderboard<S: Store + ?Sized>(
    store: &S,
    timeframe: Timeframe,
) -> Vec<LeaderboardEntry> {
    match store.leaderboard(timeframe).await {
        Ok(rows) => rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                rank: row.rank,
                name: row.username,
                avatar: row
                    .avatar_url
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| PLACEHOLDER_AVATAR.to_string()),
                bugs: row.total_bugs,
                points: row.total_points,
            })
            .collect(),
        Err(e) => {
            tracing::error!(%timeframe, error = %format!("{:#}", e), "failed to read leaderboard");
            Vec::new()
        }
    }
}

/// `squash leaderboard`: print the cached rankings.
pub async fn run_leaderboard(config: &Config, timeframe: Timeframe, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let entries = get_leaderboard(&store, timeframe).await;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No ranked contributors for timeframe '{}'.", timeframe);
        return Ok(());
    }

    println!("Leaderboard ({})", timeframe);
    println!();
    println!("  {:>4}  {:<24} {:>6} {:>8}", "RANK", "CONTRIBUTOR", "BUGS", "POINTS");
    for e in &entries {
        println!(
            "  {:>4}  {:<24} {:>6} {:>8}",
            e.rank, e.name, e.bugs, e.points
        );
    }
    Ok(())
}
