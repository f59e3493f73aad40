//! Storage abstraction for Bug Squash.
//!
//! The [`Store`] trait covers the three durable tables the engine works
//! with (contributors, contributions, rank snapshots), so the ingestion
//! pipeline and ranking engine can run against SQLite in production and
//! against [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Contribution, Contributor, ContributorTotals, NewContribution, NewContributor, RankSnapshot,
    Timeframe,
};

/// A rank snapshot joined with its contributor, as read by the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub rank: i64,
    pub contributor_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub total_bugs: i64,
    pub total_points: i64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Table | Semantics |
/// |--------|-------|-----------|
/// | [`find_contributor`](Store::find_contributor) | contributors | lookup by external id |
/// | [`get_or_create_contributor`](Store::get_or_create_contributor) | contributors | get-or-create |
/// | [`refresh_contributor`](Store::refresh_contributor) | contributors | name/avatar drift |
/// | [`get_contribution`](Store::get_contribution) | contributions | lookup by PR number |
/// | [`upsert_contribution`](Store::upsert_contribution) | contributions | upsert by PR number |
/// | [`contributor_totals_since`](Store::contributor_totals_since) | contributions | window aggregate |
/// | [`replace_rank_snapshots`](Store::replace_rank_snapshots) | rank_snapshots | atomic clear + rebuild |
/// | [`leaderboard`](Store::leaderboard) | rank_snapshots ⋈ contributors | read path |
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_contributor(&self, external_id: &str) -> Result<Option<Contributor>>;

    /// Return the contributor with `new.external_id`, inserting it first if
    /// it does not exist yet. Existing rows are returned unchanged.
    async fn get_or_create_contributor(&self, new: &NewContributor) -> Result<Contributor>;

    /// Overwrite the display name and avatar of an existing contributor.
    async fn refresh_contributor(
        &self,
        id: i64,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<()>;

    async fn get_contribution(&self, pr_number: i64) -> Result<Option<Contribution>>;

    /// Insert a contribution, or overwrite the mutable fields of the row
    /// with the same `pr_number`. The row id and `created_at` of an
    /// existing row are preserved; `updated_at` is bumped.
    async fn upsert_contribution(&self, new: &NewContribution) -> Result<Contribution>;

    /// Aggregate contributions with `merged_at >= since` per contributor.
    ///
    /// Contributors without a contribution in the window are absent.
    async fn contributor_totals_since(&self, since: i64) -> Result<Vec<ContributorTotals>>;

    /// Clear the whole ranking cache and insert `snapshots`, atomically.
    ///
    /// Either every row is replaced or, on failure, the previous cache is
    /// left untouched.
    async fn replace_rank_snapshots(&self, snapshots: &[RankSnapshot]) -> Result<()>;

    /// Snapshot rows for `timeframe` joined with their contributor,
    /// ordered by rank ascending.
    async fn leaderboard(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardRow>>;
}
