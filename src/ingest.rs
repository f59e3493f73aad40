//! Ingestion pipeline orchestration.
//!
//! Coordinates one sync run: event source search → per-event detail →
//! eligibility filter → contributor get-or-create → contribution upsert →
//! full ranking rebuild.
//!
//! # Failure Policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Search request fails | run aborts before any write |
//! | Detail or linked-issue lookup fails | event counted as failed, run continues |
//! | Eligibility rejection | event counted as skipped (not an error) |
//! | Storage write fails | run fails after a best-effort ranking rebuild |
//!
//! The ranking rebuild runs after the candidate loop whether or not some
//! events failed, so the cache always reflects every committed row.

use anyhow::Result;
use chrono::{DateTime, Utc};

use bug_squash_core::eligibility::{Eligible, EligibilityRules, PullRequestDetail, Rejection};
use bug_squash_core::models::{Complexity, NewContribution, NewContributor};
use bug_squash_core::ranking::{rebuild_rankings, RebuildReport};
use bug_squash_core::store::Store;

use crate::config::Config;
use crate::github::{CandidateEvent, EventSource};

/// Competition parameters consumed by a run.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub points_per_bug: i64,
    pub rules: EligibilityRules,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            start: config.competition.start_date,
            end: config.competition.end_date,
            points_per_bug: config.competition.points_per_bug,
            rules: EligibilityRules::new(config.github.bots.clone()),
        }
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Candidates returned by the search.
    pub scanned: usize,
    /// Candidates written as contributions.
    pub accepted: usize,
    /// Candidates rejected by the eligibility filter.
    pub skipped: usize,
    /// Candidates whose lookups failed.
    pub failed: usize,
    pub rankings: RebuildReport,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        format!(
            "Processed {} bug fix PRs ({} accepted, {} skipped, {} failed)",
            self.scanned, self.accepted, self.skipped, self.failed
        )
    }
}

enum EventOutcome {
    Accepted,
    Skipped(Rejection),
    Failed,
}

/// Compute awarded points for an accepted bug fix.
///
/// Points are flat per bug fix; the complexity is recorded alongside but
/// does not scale the award.
pub fn award_points(settings: &IngestSettings, _complexity: Complexity) -> i64 {
    settings.points_per_bug
}

/// Run one ingestion pass and rebuild the ranking cache.
///
/// `clock` is read once, after the last candidate, to anchor the `day` and
/// `week` ranking windows.
pub async fn run_ingestion<E, S, C>(
    source: &E,
    store: &S,
    settings: &IngestSettings,
    clock: C,
) -> Result<IngestReport>
where
    E: EventSource + ?Sized,
    S: Store + ?Sized,
    C: Fn() -> DateTime<Utc>,
{
    let candidates = source.search_merged(settings.start, settings.end).await?;

    let mut report = IngestReport {
        scanned: candidates.len(),
        ..Default::default()
    };

    let mut write_error = None;
    for candidate in &candidates {
        match process_event(source, store, settings, candidate).await {
            Ok(EventOutcome::Accepted) => report.accepted += 1,
            Ok(EventOutcome::Skipped(reason)) => {
                tracing::debug!(pr = candidate.number, %reason, "skipping pull request");
                report.skipped += 1;
            }
            Ok(EventOutcome::Failed) => report.failed += 1,
            Err(e) => {
                write_error = Some(e);
                break;
            }
        }
    }

    match rebuild_rankings(store, settings.start, clock()).await {
        Ok(rankings) => report.rankings = rankings,
        Err(e) if write_error.is_some() => {
            tracing::error!(error = %e, "ranking rebuild after failed run also failed");
        }
        Err(e) => return Err(e),
    }

    if let Some(e) = write_error {
        return Err(e.context("failed to store contribution"));
    }

    tracing::info!(
        scanned = report.scanned,
        accepted = report.accepted,
        skipped = report.skipped,
        failed = report.failed,
        snapshot_rows = report.rankings.total_rows(),
        "ingestion finished"
    );
    Ok(report)
}

/// Fetch, filter, and store one candidate.
///
/// Event source errors are logged and reported as [`EventOutcome::Failed`];
/// only storage errors are returned as `Err`.
async fn process_event<E, S>(
    source: &E,
    store: &S,
    settings: &IngestSettings,
    candidate: &CandidateEvent,
) -> Result<EventOutcome>
where
    E: EventSource + ?Sized,
    S: Store + ?Sized,
{
    let detail: PullRequestDetail = match source.pull_request(candidate.number).await {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(pr = candidate.number, error = %e, "failed to fetch pull request detail");
            return Ok(EventOutcome::Failed);
        }
    };

    let Eligible { author, merged_at } = match settings.rules.check(&detail) {
        Ok(eligible) => eligible,
        Err(reason) => return Ok(EventOutcome::Skipped(reason)),
    };

    match source.closes_any_issue(candidate.number).await {
        Ok(true) => {}
        Ok(false) => return Ok(EventOutcome::Skipped(Rejection::NoLinkedIssue)),
        Err(e) => {
            tracing::warn!(pr = candidate.number, error = %e, "failed to check linked issues");
            return Ok(EventOutcome::Failed);
        }
    }

    let contributor = store
        .get_or_create_contributor(&NewContributor {
            external_id: author.external_id.clone(),
            username: author.login.clone(),
            avatar_url: author.avatar_url.clone(),
        })
        .await?;
    if contributor.username != author.login || contributor.avatar_url != author.avatar_url {
        store
            .refresh_contributor(contributor.id, &author.login, author.avatar_url.as_deref())
            .await?;
    }

    let complexity =
        Complexity::classify(detail.changed_files, detail.additions, detail.deletions);
    let title = if detail.title.is_empty() {
        candidate.title.clone()
    } else {
        detail.title.clone()
    };
    let url = if detail.url.is_empty() {
        candidate.url.clone()
    } else {
        detail.url.clone()
    };

    store
        .upsert_contribution(&NewContribution {
            pr_number: candidate.number,
            title,
            url,
            contributor_id: contributor.id,
            merged_at: merged_at.timestamp(),
            complexity,
            points: award_points(settings, complexity),
        })
        .await?;

    Ok(EventOutcome::Accepted)
}
