//! In-memory [`Store`] implementation for tests.
//!
//! Uses `Vec` and `BTreeMap` behind `std::sync::RwLock`. Rank snapshot
//! replacement swaps the whole vector under one write lock, so readers see
//! either the old or the new cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{
    Contribution, Contributor, ContributorTotals, NewContribution, NewContributor, RankSnapshot,
    Timeframe,
};

use super::{LeaderboardRow, Store};

/// In-memory store for tests.
pub struct InMemoryStore {
    contributors: RwLock<Vec<Contributor>>,
    contributions: RwLock<BTreeMap<i64, Contribution>>,
    snapshots: RwLock<Vec<RankSnapshot>>,
    next_contribution_id: RwLock<i64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            contributors: RwLock::new(Vec::new()),
            contributions: RwLock::new(BTreeMap::new()),
            snapshots: RwLock::new(Vec::new()),
            next_contribution_id: RwLock::new(1),
        }
    }

    /// All stored contributions, ordered by PR number.
    pub fn contributions(&self) -> Vec<Contribution> {
        self.contributions.read().unwrap().values().cloned().collect()
    }

    /// All stored contributors, in insertion order.
    pub fn contributors(&self) -> Vec<Contributor> {
        self.contributors.read().unwrap().clone()
    }

    /// The current ranking cache, in insertion order.
    pub fn snapshots(&self) -> Vec<RankSnapshot> {
        self.snapshots.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_contributor(&self, external_id: &str) -> Result<Option<Contributor>> {
        let contributors = self.contributors.read().unwrap();
        Ok(contributors
            .iter()
            .find(|c| c.external_id == external_id)
            .cloned())
    }

    async fn get_or_create_contributor(&self, new: &NewContributor) -> Result<Contributor> {
        let mut contributors = self.contributors.write().unwrap();
        if let Some(existing) = contributors.iter().find(|c| c.external_id == new.external_id) {
            return Ok(existing.clone());
        }
        let now = now_ts();
        let contributor = Contributor {
            id: contributors.len() as i64 + 1,
            external_id: new.external_id.clone(),
            username: new.username.clone(),
            avatar_url: new.avatar_url.clone(),
            created_at: now,
            updated_at: now,
        };
        contributors.push(contributor.clone());
        Ok(contributor)
    }

    async fn refresh_contributor(
        &self,
        id: i64,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        let mut contributors = self.contributors.write().unwrap();
        match contributors.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.username = username.to_string();
                c.avatar_url = avatar_url.map(str::to_string);
                c.updated_at = now_ts();
                Ok(())
            }
            None => bail!("contributor {} not found", id),
        }
    }

    async fn get_contribution(&self, pr_number: i64) -> Result<Option<Contribution>> {
        Ok(self.contributions.read().unwrap().get(&pr_number).cloned())
    }

    async fn upsert_contribution(&self, new: &NewContribution) -> Result<Contribution> {
        let known = self
            .contributors
            .read()
            .unwrap()
            .iter()
            .any(|c| c.id == new.contributor_id);
        if !known {
            bail!(
                "FOREIGN KEY constraint failed: contributor {} not found",
                new.contributor_id
            );
        }

        let now = now_ts();
        let mut contributions = self.contributions.write().unwrap();
        let row = match contributions.get(&new.pr_number) {
            Some(existing) => Contribution {
                id: existing.id,
                created_at: existing.created_at,
                ..contribution_from(new, existing.id, now)
            },
            None => {
                let mut next_id = self.next_contribution_id.write().unwrap();
                let id = *next_id;
                *next_id += 1;
                contribution_from(new, id, now)
            }
        };
        contributions.insert(new.pr_number, row.clone());
        Ok(row)
    }

    async fn contributor_totals_since(&self, since: i64) -> Result<Vec<ContributorTotals>> {
        let contributions = self.contributions.read().unwrap();
        let mut totals: HashMap<i64, ContributorTotals> = HashMap::new();
        for c in contributions.values().filter(|c| c.merged_at >= since) {
            let entry = totals.entry(c.contributor_id).or_insert(ContributorTotals {
                contributor_id: c.contributor_id,
                bug_count: 0,
                total_points: 0,
            });
            entry.bug_count += 1;
            entry.total_points += c.points;
        }
        let mut out: Vec<ContributorTotals> = totals.into_values().collect();
        out.sort_by_key(|t| t.contributor_id);
        Ok(out)
    }

    async fn replace_rank_snapshots(&self, snapshots: &[RankSnapshot]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for s in snapshots {
            if !seen.insert((s.contributor_id, s.timeframe)) {
                bail!(
                    "UNIQUE constraint failed: rank_snapshots ({}, {})",
                    s.contributor_id,
                    s.timeframe
                );
            }
        }
        *self.snapshots.write().unwrap() = snapshots.to_vec();
        Ok(())
    }

    async fn leaderboard(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardRow>> {
        let snapshots = self.snapshots.read().unwrap();
        let contributors = self.contributors.read().unwrap();
        let mut rows: Vec<LeaderboardRow> = snapshots
            .iter()
            .filter(|s| s.timeframe == timeframe)
            .filter_map(|s| {
                contributors
                    .iter()
                    .find(|c| c.id == s.contributor_id)
                    .map(|c| LeaderboardRow {
                        rank: s.rank,
                        contributor_id: c.id,
                        username: c.username.clone(),
                        avatar_url: c.avatar_url.clone(),
                        total_bugs: s.total_bugs,
                        total_points: s.total_points,
                    })
            })
            .collect();
        rows.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.username.cmp(&b.username)));
        Ok(rows)
    }
}

fn contribution_from(new: &NewContribution, id: i64, now: i64) -> Contribution {
    Contribution {
        id,
        pr_number: new.pr_number,
        title: new.title.clone(),
        url: new.url.clone(),
        contributor_id: new.contributor_id,
        merged_at: new.merged_at,
        complexity: new.complexity,
        points: new.points,
        created_at: now,
        updated_at: now,
    }
}
