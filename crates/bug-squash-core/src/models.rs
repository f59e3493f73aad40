//! Core data models shared by the ingestion pipeline, the ranking engine,
//! and the storage backends.
//!
//! All timestamps are unix seconds (UTC), matching the `INTEGER` columns
//! of the SQLite schema.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A ranking window. Each one defines the lower bound of the merge
/// timestamps that count towards a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// The last 24 hours.
    Day,
    /// The last 7 days.
    Week,
    /// Everything since the competition start date.
    #[default]
    All,
}

impl Timeframe {
    /// Every supported timeframe, in the order the ranking engine
    /// recomputes them.
    pub const ALL: [Timeframe; 3] = [Timeframe::All, Timeframe::Week, Timeframe::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::All => "all",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "all" => Ok(Timeframe::All),
            other => bail!("invalid timeframe: '{}'. Must be day, week, or all.", other),
        }
    }
}

/// Size classification of a bug fix.
///
/// Recorded on every contribution. Points are currently flat per bug fix,
/// so the classification does not influence scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Normal,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Normal => "normal",
            Complexity::Complex => "complex",
        }
    }

    /// Classify a pull request by the size of its diff.
    ///
    /// | Class | Rule |
    /// |-------|------|
    /// | `complex` | more than 10 files or more than 500 changed lines |
    /// | `normal` | more than 3 files or more than 100 changed lines |
    /// | `simple` | everything else |
    pub fn classify(changed_files: u64, additions: u64, deletions: u64) -> Self {
        let total_changes = additions + deletions;
        if changed_files > 10 || total_changes > 500 {
            Complexity::Complex
        } else if changed_files > 3 || total_changes > 100 {
            Complexity::Normal
        } else {
            Complexity::Simple
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(Complexity::Simple),
            "normal" => Ok(Complexity::Normal),
            "complex" => Ok(Complexity::Complex),
            other => bail!("invalid complexity: '{}'", other),
        }
    }
}

/// A competitor, identified by their GitHub user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub id: i64,
    /// External platform identifier (GitHub numeric user id, as text).
    pub external_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Identity fields observed on a pull request author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContributor {
    pub external_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// An accepted bug fix, keyed by its pull request number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub id: i64,
    pub pr_number: i64,
    pub title: String,
    pub url: String,
    pub contributor_id: i64,
    pub merged_at: i64,
    pub complexity: Complexity,
    pub points: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The mutable fields of a contribution, written by an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContribution {
    pub pr_number: i64,
    pub title: String,
    pub url: String,
    pub contributor_id: i64,
    pub merged_at: i64,
    pub complexity: Complexity,
    pub points: i64,
}

/// Per-contributor aggregate over a ranking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributorTotals {
    pub contributor_id: i64,
    pub bug_count: i64,
    pub total_points: i64,
}

/// One row of the derived ranking cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankSnapshot {
    pub contributor_id: i64,
    pub timeframe: Timeframe,
    pub rank: i64,
    pub total_bugs: i64,
    pub total_points: i64,
    pub last_updated: i64,
}
