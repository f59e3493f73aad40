//! Ranking engine: rebuilds the per-timeframe rank snapshot cache from the
//! contribution table.
//!
//! # Algorithm
//!
//! For each [`Timeframe`]:
//!
//! 1. Compute the window's lower bound ([`window_start`]): `day` = now − 24h,
//!    `week` = now − 7d, `all` = competition start. The bound is inclusive.
//! 2. Aggregate contributions merged at or after the bound per contributor.
//! 3. Sort by total points, descending. Equal totals keep their incoming
//!    order (stable sort).
//! 4. Assign ranks starting at 1. Equal totals share a rank; the rank only
//!    advances by one when the total strictly decreases, so points
//!    `[10, 10, 5]` rank as `[1, 1, 2]`.
//!
//! Snapshots for all timeframes are computed before anything is written,
//! then handed to [`Store::replace_rank_snapshots`] in a single call: the
//! cache is cleared exactly once per rebuild and the swap is atomic.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use crate::models::{ContributorTotals, RankSnapshot, Timeframe};
use crate::store::Store;

/// Summary of a completed rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Snapshot rows written per timeframe, in rebuild order.
    pub rows: Vec<(Timeframe, usize)>,
}

impl RebuildReport {
    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|(_, n)| n).sum()
    }

    pub fn rows_for(&self, timeframe: Timeframe) -> usize {
        self.rows
            .iter()
            .find(|(tf, _)| *tf == timeframe)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Inclusive lower bound of `timeframe` as seen at `now`.
pub fn window_start(
    timeframe: Timeframe,
    now: DateTime<Utc>,
    competition_start: DateTime<Utc>,
) -> DateTime<Utc> {
    match timeframe {
        Timeframe::Day => now - Duration::hours(24),
        Timeframe::Week => now - Duration::days(7),
        Timeframe::All => competition_start,
    }
}

/// Turn window aggregates into ranked snapshot rows.
pub fn assign_ranks(
    mut totals: Vec<ContributorTotals>,
    timeframe: Timeframe,
    last_updated: i64,
) -> Vec<RankSnapshot> {
    totals.sort_by(|a, b| b.total_points.cmp(&a.total_points));

    let mut snapshots = Vec::with_capacity(totals.len());
    let mut rank = 1;
    let mut last_points: Option<i64> = None;

    for t in totals {
        if let Some(prev) = last_points {
            if t.total_points < prev {
                rank += 1;
            }
        }
        snapshots.push(RankSnapshot {
            contributor_id: t.contributor_id,
            timeframe,
            rank,
            total_bugs: t.bug_count,
            total_points: t.total_points,
            last_updated,
        });
        last_points = Some(t.total_points);
    }

    snapshots
}

/// Recompute every timeframe and atomically replace the ranking cache.
///
/// `competition_start` bounds the `all` window; `now` anchors `day` and
/// `week`. Any store failure aborts the rebuild before or during the
/// replacement, and the previous cache stays in place.
pub async fn rebuild_rankings<S: Store + ?Sized>(
    store: &S,
    competition_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<RebuildReport> {
    let mut all_snapshots = Vec::new();
    let mut report = RebuildReport::default();

    for timeframe in Timeframe::ALL {
        let since = window_start(timeframe, now, competition_start);
        let totals = store
            .contributor_totals_since(since.timestamp())
            .await
            .with_context(|| format!("failed to aggregate '{}' window", timeframe))?;
        let snapshots = assign_ranks(totals, timeframe, now.timestamp());
        report.rows.push((timeframe, snapshots.len()));
        all_snapshots.extend(snapshots);
    }

    store
        .replace_rank_snapshots(&all_snapshots)
        .await
        .context("failed to replace rank snapshots")?;

    Ok(report)
}
