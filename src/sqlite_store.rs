//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`migrate`](crate::migrate): `contributors`, `contributions`, and
//! `rank_snapshots`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use bug_squash_core::models::{
    Contribution, Contributor, ContributorTotals, NewContribution, NewContributor, RankSnapshot,
    Timeframe,
};
use bug_squash_core::store::{LeaderboardRow, Store};

/// SQLite implementation of the [`Store`] trait.
///
/// Wraps a [`SqlitePool`]; the pool is cheap to clone, so one store can be
/// shared by the sync coordinator and the HTTP handlers.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn contributor_from_row(row: &SqliteRow) -> Contributor {
    Contributor {
        id: row.get("id"),
        external_id: row.get("external_id"),
        username: row.get("username"),
        avatar_url: row.get("avatar_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn contribution_from_row(row: &SqliteRow) -> Result<Contribution> {
    let complexity: String = row.get("complexity");
    Ok(Contribution {
        id: row.get("id"),
        pr_number: row.get("pr_number"),
        title: row.get("title"),
        url: row.get("url"),
        contributor_id: row.get("contributor_id"),
        merged_at: row.get("merged_at"),
        complexity: complexity.parse()?,
        points: row.get("points"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_contributor(&self, external_id: &str) -> Result<Option<Contributor>> {
        let row = sqlx::query(
            "SELECT id, external_id, username, avatar_url, created_at, updated_at FROM contributors WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(contributor_from_row))
    }

    async fn get_or_create_contributor(&self, new: &NewContributor) -> Result<Contributor> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO contributors (external_id, username, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO NOTHING
            "#,
        )
        .bind(&new.external_id)
        .bind(&new.username)
        .bind(&new.avatar_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_contributor(&new.external_id)
            .await?
            .with_context(|| format!("contributor {} vanished after insert", new.external_id))
    }

    async fn refresh_contributor(
        &self,
        id: i64,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE contributors SET username = ?, avatar_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(username)
        .bind(avatar_url)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("contributor {} not found", id);
        }
        Ok(())
    }

    async fn get_contribution(&self, pr_number: i64) -> Result<Option<Contribution>> {
        let row = sqlx::query(
            r#"
            SELECT id, pr_number, title, url, contributor_id, merged_at, complexity, points,
                   created_at, updated_at
            FROM contributions WHERE pr_number = ?
            "#,
        )
        .bind(pr_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(contribution_from_row).transpose()
    }

    async fn upsert_contribution(&self, new: &NewContribution) -> Result<Contribution> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO contributions (pr_number, title, url, contributor_id, merged_at,
                                       complexity, points, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pr_number) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                contributor_id = excluded.contributor_id,
                merged_at = excluded.merged_at,
                complexity = excluded.complexity,
                points = excluded.points,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new.pr_number)
        .bind(&new.title)
        .bind(&new.url)
        .bind(new.contributor_id)
        .bind(new.merged_at)
        .bind(new.complexity.as_str())
        .bind(new.points)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_contribution(new.pr_number)
            .await?
            .with_context(|| format!("contribution #{} vanished after upsert", new.pr_number))
    }

    async fn contributor_totals_since(&self, since: i64) -> Result<Vec<ContributorTotals>> {
        let rows = sqlx::query(
            r#"
            SELECT contributor_id,
                   COUNT(id) AS bug_count,
                   COALESCE(SUM(points), 0) AS total_points
            FROM contributions
            WHERE merged_at >= ?
            GROUP BY contributor_id
            ORDER BY total_points DESC, contributor_id ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ContributorTotals {
                contributor_id: row.get("contributor_id"),
                bug_count: row.get("bug_count"),
                total_points: row.get("total_points"),
            })
            .collect())
    }

    async fn replace_rank_snapshots(&self, snapshots: &[RankSnapshot]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rank_snapshots")
            .execute(&mut *tx)
            .await?;

        for s in snapshots {
            sqlx::query(
                r#"
                INSERT INTO rank_snapshots (contributor_id, timeframe, rank, total_bugs,
                                            total_points, last_updated)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(s.contributor_id)
            .bind(s.timeframe.as_str())
            .bind(s.rank)
            .bind(s.total_bugs)
            .bind(s.total_points)
            .bind(s.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn leaderboard(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardRow>> {
        let rows = sqlx::query(
            r#"
            SELECT rs.rank, rs.contributor_id, c.username, c.avatar_url,
                   rs.total_bugs, rs.total_points
            FROM rank_snapshots rs
            JOIN contributors c ON c.id = rs.contributor_id
            WHERE rs.timeframe = ?
            ORDER BY rs.rank ASC, c.username ASC
            "#,
        )
        .bind(timeframe.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LeaderboardRow {
                rank: row.get("rank"),
                contributor_id: row.get("contributor_id"),
                username: row.get("username"),
                avatar_url: row.get("avatar_url"),
                total_bugs: row.get("total_bugs"),
                total_points: row.get("total_points"),
            })
            .collect())
    }
}
