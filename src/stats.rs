//! Database statistics and health overview.
//!
//! Provides a quick summary of what's been ingested: contributor and
//! contribution counts, awarded points, the most recent merge, and how many
//! contributors are ranked in each timeframe. Used by `squash stats` to give
//! confidence that syncs and ranking rebuilds are working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Ranking cache coverage for one timeframe.
struct TimeframeStats {
    timeframe: String,
    ranked: i64,
    last_updated: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let contributors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contributors")
        .fetch_one(&pool)
        .await?;

    let contributions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contributions")
        .fetch_one(&pool)
        .await?;

    let points: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(points), 0) FROM contributions")
        .fetch_one(&pool)
        .await?;

    let last_merge: Option<i64> = sqlx::query_scalar("SELECT MAX(merged_at) FROM contributions")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Bug Squash — Database Stats");
    println!("===========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!(
        "  Competition:   {} → {}",
        config.competition.start_date.format("%Y-%m-%d %H:%M"),
        config.competition.end_date.format("%Y-%m-%d %H:%M")
    );
    println!();
    println!("  Contributors:  {}", contributors);
    println!("  Bug fixes:     {}", contributions);
    println!("  Points:        {}", points);
    println!(
        "  Last merge:    {}",
        last_merge.map(format_ts_relative).unwrap_or_else(|| "never".to_string())
    );

    let rows = sqlx::query(
        r#"
        SELECT timeframe, COUNT(*) AS ranked, MAX(last_updated) AS last_updated
        FROM rank_snapshots
        GROUP BY timeframe
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut by_timeframe: Vec<TimeframeStats> = rows
        .iter()
        .map(|row| TimeframeStats {
            timeframe: row.get("timeframe"),
            ranked: row.get("ranked"),
            last_updated: row.get("last_updated"),
        })
        .collect();
    by_timeframe.sort_by_key(|t| match t.timeframe.as_str() {
        "all" => 0,
        "week" => 1,
        _ => 2,
    });

    println!();
    if by_timeframe.is_empty() {
        println!("  Rankings:      not built yet (run `squash rank`)");
    } else {
        println!("  Rankings:");
        println!("  {:<10} {:>8}   {}", "TIMEFRAME", "RANKED", "UPDATED");
        println!("  {}", "-".repeat(36));
        for t in &by_timeframe {
            let updated = match t.last_updated {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!("  {:<10} {:>8}   {}", t.timeframe, t.ranked, updated);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative_future_is_absolute() {
        let future = chrono::Utc::now().timestamp() + 86400 * 400;
        assert!(format_ts_relative(future).contains('-'));
    }
}
