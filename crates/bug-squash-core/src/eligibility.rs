//! Eligibility rules for merged pull requests.
//!
//! Only community bug fixes count towards the competition. A candidate is
//! rejected (skipped, never an error) when any of the following holds:
//!
//! 1. It has no resolvable author.
//! 2. It was never merged.
//! 3. Its author association marks the author as a project member.
//! 4. Its author is an automation account.
//! 5. It does not close at least one tracked issue.
//!
//! Rules 1–4 only need the pull request detail and are evaluated by
//! [`EligibilityRules::check`]. Rule 5 needs a second lookup against the
//! event source, so the ingestion pipeline performs it after `check`
//! passes and reports [`Rejection::NoLinkedIssue`] itself.

use chrono::{DateTime, Utc};
use std::fmt;

/// Author associations that identify a project member.
pub const MEMBER_ASSOCIATIONS: &[&str] = &["MEMBER", "OWNER", "COLLABORATOR"];

/// Automation accounts excluded by default.
pub const DEFAULT_BOTS: &[&str] = &["dependabot[bot]", "github-actions[bot]"];

/// The author of a pull request as reported by the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestAuthor {
    /// Stable numeric platform id, rendered as text.
    pub external_id: String,
    pub login: String,
    pub avatar_url: Option<String>,
}

/// Authoritative detail for a single candidate pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDetail {
    pub number: i64,
    pub title: String,
    pub url: String,
    pub author: Option<PullRequestAuthor>,
    pub author_association: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub changed_files: u64,
    pub additions: u64,
    pub deletions: u64,
}

/// Why a candidate did not count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoAuthor,
    NotMerged,
    ProjectMember(String),
    Bot(String),
    NoLinkedIssue,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoAuthor => write!(f, "no resolvable author"),
            Rejection::NotMerged => write!(f, "not merged"),
            Rejection::ProjectMember(assoc) => write!(f, "author is a project member ({})", assoc),
            Rejection::Bot(login) => write!(f, "author is an automation account ({})", login),
            Rejection::NoLinkedIssue => write!(f, "does not close any issue"),
        }
    }
}

/// What a passing [`EligibilityRules::check`] hands back to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligible<'a> {
    pub author: &'a PullRequestAuthor,
    pub merged_at: DateTime<Utc>,
}

/// The configurable part of the eligibility filter.
#[derive(Debug, Clone)]
pub struct EligibilityRules {
    bots: Vec<String>,
}

impl EligibilityRules {
    pub fn new(bots: Vec<String>) -> Self {
        Self { bots }
    }

    /// Returns true when `login` belongs to an automation account: either
    /// listed explicitly or carrying GitHub's `[bot]` suffix.
    pub fn is_bot(&self, login: &str) -> bool {
        login.ends_with("[bot]") || self.bots.iter().any(|b| b.eq_ignore_ascii_case(login))
    }

    /// Apply rules 1–4 to `detail`, returning the author and merge time on
    /// success.
    pub fn check<'a>(&self, detail: &'a PullRequestDetail) -> Result<Eligible<'a>, Rejection> {
        let author = detail.author.as_ref().ok_or(Rejection::NoAuthor)?;
        if author.login.is_empty() || author.external_id.is_empty() {
            return Err(Rejection::NoAuthor);
        }
        let merged_at = detail.merged_at.ok_or(Rejection::NotMerged)?;

        let assoc = detail.author_association.to_ascii_uppercase();
        if MEMBER_ASSOCIATIONS.contains(&assoc.as_str()) {
            return Err(Rejection::ProjectMember(assoc));
        }
        if self.is_bot(&author.login) {
            return Err(Rejection::Bot(author.login.clone()));
        }

        Ok(Eligible { author, merged_at })
    }
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self::new(DEFAULT_BOTS.iter().map(|s| s.to_string()).collect())
    }
}
