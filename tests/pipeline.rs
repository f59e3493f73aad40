//! Ingestion pipeline tests against a scripted event source and the
//! in-memory store.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use bug_squash::bug_squash_core::eligibility::{
    EligibilityRules, PullRequestAuthor, PullRequestDetail,
};
use bug_squash::bug_squash_core::models::{
    Contribution, Contributor, ContributorTotals, NewContribution, NewContributor, RankSnapshot,
    Timeframe,
};
use bug_squash::bug_squash_core::store::memory::InMemoryStore;
use bug_squash::bug_squash_core::store::{LeaderboardRow, Store};
use bug_squash::github::{CandidateEvent, EventSource};
use bug_squash::ingest::{run_ingestion, IngestSettings};
use bug_squash::leaderboard::get_leaderboard;
use bug_squash::sync::SyncCoordinator;

// ============ Fixtures ============

fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    ts(2025, 4, 10, 12)
}

fn settings() -> IngestSettings {
    IngestSettings {
        start: ts(2025, 3, 24, 0),
        end: ts(2025, 4, 24, 23),
        points_per_bug: 10,
        rules: EligibilityRules::default(),
    }
}

fn pr(number: i64, user_id: i64, login: &str, merged_at: DateTime<Utc>) -> PullRequestDetail {
    PullRequestDetail {
        number,
        title: format!("Fix bug #{}", number),
        url: format!("https://github.com/acme/app/pull/{}", number),
        author: Some(PullRequestAuthor {
            external_id: user_id.to_string(),
            login: login.to_string(),
            avatar_url: Some(format!("https://avatars.example/{}", user_id)),
        }),
        author_association: "CONTRIBUTOR".to_string(),
        merged_at: Some(merged_at),
        changed_files: 1,
        additions: 10,
        deletions: 2,
    }
}

/// Scripted [`EventSource`]: every PR in `details` is a search hit.
#[derive(Default)]
struct FakeSource {
    details: Vec<PullRequestDetail>,
    no_issue: HashSet<i64>,
    broken_detail: HashSet<i64>,
    fail_search: bool,
    detail_calls: AtomicUsize,
}

impl FakeSource {
    fn new(details: Vec<PullRequestDetail>) -> Self {
        Self {
            details,
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn search_merged(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CandidateEvent>> {
        if self.fail_search {
            bail!("GitHub API error 503 Service Unavailable (search)");
        }
        Ok(self
            .details
            .iter()
            .map(|d| CandidateEvent {
                number: d.number,
                title: d.title.clone(),
                url: d.url.clone(),
            })
            .collect())
    }

    async fn pull_request(&self, number: i64) -> Result<PullRequestDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_detail.contains(&number) {
            bail!("GitHub API error 502 Bad Gateway (pull request detail)");
        }
        self.details
            .iter()
            .find(|d| d.number == number)
            .cloned()
            .ok_or_else(|| anyhow!("no such pull request {}", number))
    }

    async fn closes_any_issue(&self, number: i64) -> Result<bool> {
        Ok(!self.no_issue.contains(&number))
    }
}

/// Delegates to an [`InMemoryStore`] but refuses to store one PR.
struct FailingStore {
    inner: InMemoryStore,
    reject_pr: i64,
}

#[async_trait]
impl Store for FailingStore {
    async fn find_contributor(&self, external_id: &str) -> Result<Option<Contributor>> {
        self.inner.find_contributor(external_id).await
    }
    async fn get_or_create_contributor(&self, new: &NewContributor) -> Result<Contributor> {
        self.inner.get_or_create_contributor(new).await
    }
    async fn refresh_contributor(
        &self,
        id: i64,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.inner.refresh_contributor(id, username, avatar_url).await
    }
    async fn get_contribution(&self, pr_number: i64) -> Result<Option<Contribution>> {
        self.inner.get_contribution(pr_number).await
    }
    async fn upsert_contribution(&self, new: &NewContribution) -> Result<Contribution> {
        if new.pr_number == self.reject_pr {
            bail!("disk I/O error");
        }
        self.inner.upsert_contribution(new).await
    }
    async fn contributor_totals_since(&self, since: i64) -> Result<Vec<ContributorTotals>> {
        self.inner.contributor_totals_since(since).await
    }
    async fn replace_rank_snapshots(&self, snapshots: &[RankSnapshot]) -> Result<()> {
        self.inner.replace_rank_snapshots(snapshots).await
    }
    async fn leaderboard(&self, timeframe: Timeframe) -> Result<Vec<LeaderboardRow>> {
        self.inner.leaderboard(timeframe).await
    }
}

fn ranks(store: &InMemoryStore, timeframe: Timeframe) -> HashMap<i64, (i64, i64)> {
    store
        .snapshots()
        .into_iter()
        .filter(|s| s.timeframe == timeframe)
        .map(|s| (s.contributor_id, (s.rank, s.total_points)))
        .collect()
}

// ============ Scenarios ============

#[tokio::test]
async fn test_end_to_end_rankings_per_timeframe() {
    let source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 4, 10, 8)),
        pr(2, 100, "alice", ts(2025, 4, 5, 9)),
        pr(3, 100, "alice", ts(2025, 3, 30, 9)),
        pr(4, 200, "bob", ts(2025, 4, 9, 20)),
    ]);
    let store = InMemoryStore::new();

    let report = run_ingestion(&source, &store, &settings(), now).await.unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.accepted, 4);
    assert_eq!(
        report.summary(),
        "Processed 4 bug fix PRs (4 accepted, 0 skipped, 0 failed)"
    );

    let alice = store.find_contributor("100").await.unwrap().unwrap().id;
    let bob = store.find_contributor("200").await.unwrap().unwrap().id;

    let all = ranks(&store, Timeframe::All);
    assert_eq!(all[&alice], (1, 30));
    assert_eq!(all[&bob], (2, 10));

    let week = ranks(&store, Timeframe::Week);
    assert_eq!(week[&alice], (1, 20));
    assert_eq!(week[&bob], (2, 10));

    // Both have exactly one fix in the last 24 hours.
    let day = ranks(&store, Timeframe::Day);
    assert_eq!(day[&alice], (1, 10));
    assert_eq!(day[&bob], (1, 10));

    assert_eq!(report.rankings.rows_for(Timeframe::All), 2);
    assert_eq!(report.rankings.total_rows(), 6);

    let board = get_leaderboard(&store, Timeframe::All).await;
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].name, "alice");
    assert_eq!(board[0].bugs, 3);
    assert_eq!(board[0].points, 30);
    assert_eq!(board[1].rank, 2);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 4, 1, 8)),
        pr(2, 200, "bob", ts(2025, 4, 2, 8)),
    ]);
    let store = InMemoryStore::new();

    run_ingestion(&source, &store, &settings(), now).await.unwrap();
    let first_contributions = store.contributions();
    let first_snapshots = ranks(&store, Timeframe::All);

    run_ingestion(&source, &store, &settings(), now).await.unwrap();

    assert_eq!(store.contributors().len(), 2);
    let second_contributions = store.contributions();
    assert_eq!(second_contributions.len(), 2);
    for (a, b) in first_contributions.iter().zip(&second_contributions) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.pr_number, b.pr_number);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.points, b.points);
    }
    assert_eq!(ranks(&store, Timeframe::All), first_snapshots);
}

#[tokio::test]
async fn test_member_and_bot_prs_are_skipped() {
    let mut member = pr(1, 100, "maintainer", ts(2025, 4, 1, 8));
    member.author_association = "MEMBER".to_string();
    let mut owner = pr(2, 101, "owner", ts(2025, 4, 1, 8));
    owner.author_association = "owner".to_string();
    let bot = pr(3, 102, "dependabot[bot]", ts(2025, 4, 1, 8));
    let renovate = pr(4, 103, "renovate[bot]", ts(2025, 4, 1, 8));
    let outsider = pr(5, 200, "carol", ts(2025, 4, 1, 8));

    let source = FakeSource::new(vec![member, owner, bot, renovate, outsider]);
    let store = InMemoryStore::new();

    let report = run_ingestion(&source, &store, &settings(), now).await.unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(report.skipped, 4);
    assert_eq!(store.contributors().len(), 1);
    assert_eq!(store.contributors()[0].username, "carol");
    assert!(store.get_contribution(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pr_without_linked_issue_is_skipped() {
    let mut source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 4, 1, 8)),
        pr(2, 100, "alice", ts(2025, 4, 2, 8)),
    ]);
    source.no_issue.insert(2);
    let store = InMemoryStore::new();

    let report = run_ingestion(&source, &store, &settings(), now).await.unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(report.skipped, 1);
    assert!(store.get_contribution(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unmerged_and_authorless_prs_are_skipped() {
    let mut unmerged = pr(1, 100, "alice", ts(2025, 4, 1, 8));
    unmerged.merged_at = None;
    let mut ghost = pr(2, 0, "ghost", ts(2025, 4, 1, 8));
    ghost.author = None;

    let source = FakeSource::new(vec![unmerged, ghost]);
    let store = InMemoryStore::new();

    let report = run_ingestion(&source, &store, &settings(), now).await.unwrap();
    assert_eq!(report.skipped, 2);
    assert!(store.contributions().is_empty());
    assert!(store.snapshots().is_empty());
}

#[tokio::test]
async fn test_detail_failure_does_not_stop_the_run() {
    let mut source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 4, 1, 8)),
        pr(2, 200, "bob", ts(2025, 4, 2, 8)),
        pr(3, 300, "carol", ts(2025, 4, 3, 8)),
    ]);
    source.broken_detail.insert(2);
    let store = InMemoryStore::new();

    let report = run_ingestion(&source, &store, &settings(), now).await.unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 3);
    assert_eq!(ranks(&store, Timeframe::All).len(), 2);
}

#[tokio::test]
async fn test_search_failure_aborts_without_writes() {
    let mut source = FakeSource::new(vec![pr(1, 100, "alice", ts(2025, 4, 1, 8))]);
    source.fail_search = true;
    let store = InMemoryStore::new();

    let err = run_ingestion(&source, &store, &settings(), now)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("search"));
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 0);
    assert!(store.contributors().is_empty());
    assert!(store.snapshots().is_empty());
}

#[tokio::test]
async fn test_storage_failure_fails_run_after_rebuild() {
    let source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 4, 1, 8)),
        pr(2, 200, "bob", ts(2025, 4, 2, 8)),
        pr(3, 300, "carol", ts(2025, 4, 3, 8)),
    ]);
    let store = FailingStore {
        inner: InMemoryStore::new(),
        reject_pr: 2,
    };

    let err = run_ingestion(&source, &store, &settings(), now)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("failed to store contribution"));

    // PR 1 was committed before the failure and is ranked; the loop stopped at PR 2.
    assert_eq!(store.inner.contributions().len(), 1);
    let all = ranks(&store.inner, Timeframe::All);
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_renamed_contributor_is_refreshed() {
    let store = InMemoryStore::new();
    run_ingestion(
        &FakeSource::new(vec![pr(1, 100, "alice", ts(2025, 4, 1, 8))]),
        &store,
        &settings(),
        now,
    )
    .await
    .unwrap();

    run_ingestion(
        &FakeSource::new(vec![
            pr(1, 100, "alice", ts(2025, 4, 1, 8)),
            pr(2, 100, "alice-renamed", ts(2025, 4, 2, 8)),
        ]),
        &store,
        &settings(),
        now,
    )
    .await
    .unwrap();

    let contributors = store.contributors();
    assert_eq!(contributors.len(), 1);
    assert_eq!(contributors[0].username, "alice-renamed");
    let board = get_leaderboard(&store, Timeframe::All).await;
    assert_eq!(board[0].name, "alice-renamed");
    assert_eq!(board[0].bugs, 2);
}

#[tokio::test]
async fn test_merge_before_competition_is_not_ranked() {
    let source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 3, 20, 8)),
        pr(2, 200, "bob", ts(2025, 4, 2, 8)),
    ]);
    let store = InMemoryStore::new();

    run_ingestion(&source, &store, &settings(), now).await.unwrap();
    let alice = store.find_contributor("100").await.unwrap().unwrap().id;
    assert!(!ranks(&store, Timeframe::All).contains_key(&alice));
}

#[tokio::test]
async fn test_windows_are_anchored_after_the_last_candidate() {
    // Merged after the run started; the day window must still see it.
    let late_merge = ts(2025, 4, 11, 9);
    let source = FakeSource::new(vec![
        pr(1, 100, "alice", ts(2025, 4, 10, 8)),
        pr(2, 200, "bob", late_merge),
    ]);
    let store = InMemoryStore::new();
    let reads = AtomicUsize::new(0);

    let clock = || {
        reads.fetch_add(1, Ordering::SeqCst);
        assert_eq!(source.detail_calls.load(Ordering::SeqCst), 2);
        ts(2025, 4, 11, 10)
    };
    run_ingestion(&source, &store, &settings(), clock)
        .await
        .unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    let bob = store.find_contributor("200").await.unwrap().unwrap().id;
    assert_eq!(ranks(&store, Timeframe::Day)[&bob], (1, 10));
}

// ============ Single flight ============

/// Search blocks until released, so a run can be held open.
struct GatedSource {
    inner: FakeSource,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl EventSource for GatedSource {
    async fn search_merged(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandidateEvent>> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.search_merged(start, end).await
    }

    async fn pull_request(&self, number: i64) -> Result<PullRequestDetail> {
        self.inner.pull_request(number).await
    }

    async fn closes_any_issue(&self, number: i64) -> Result<bool> {
        self.inner.closes_any_issue(number).await
    }
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = GatedSource {
        inner: FakeSource::new(vec![pr(1, 100, "alice", Utc::now())]),
        entered: entered.clone(),
        release: release.clone(),
    };
    let store = Arc::new(InMemoryStore::new());
    let mut ingest = settings();
    ingest.start = Utc::now() - chrono::Duration::days(7);
    ingest.end = Utc::now() + chrono::Duration::days(7);
    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::new(source),
        store.clone(),
        ingest,
    ));

    let first = {
        let c = coordinator.clone();
        tokio::spawn(async move { c.trigger().await })
    };
    entered.notified().await;

    let second = coordinator.trigger().await;
    assert!(!second.success);
    assert!(second.busy);
    assert_eq!(second.message, "sync already in progress");

    let refresh = coordinator.refresh_rankings().await;
    assert!(refresh.busy);

    release.notify_one();
    let first = first.await.unwrap();
    assert!(first.success, "{}", first.message);
    assert_eq!(
        first.message,
        "Processed 1 bug fix PRs (1 accepted, 0 skipped, 0 failed)"
    );
    assert_eq!(store.contributions().len(), 1);

    // Lock is released once the run finishes.
    let again = coordinator.refresh_rankings().await;
    assert!(again.success);
}

#[tokio::test]
async fn test_failed_trigger_reports_error_message() {
    let mut source = FakeSource::new(Vec::new());
    source.fail_search = true;
    let coordinator = SyncCoordinator::new(
        Arc::new(source),
        Arc::new(InMemoryStore::new()),
        settings(),
    );

    let outcome = coordinator.trigger().await;
    assert!(!outcome.success);
    assert!(!outcome.busy);
    assert!(outcome.message.starts_with("Error: "));
    assert!(outcome.message.contains("503"));
}
