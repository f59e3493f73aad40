//! GitHub event source.
//!
//! Fetches candidate bug fixes from the GitHub REST and GraphQL APIs:
//!
//! | Step | Endpoint |
//! |------|----------|
//! | Search merged, labelled PRs | `GET /search/issues` |
//! | Pull request detail | `GET /repos/{owner}/{repo}/pulls/{number}` |
//! | Linked issue check | `POST /graphql` (`closingIssuesReferences`) |
//!
//! The pipeline talks to the [`EventSource`] trait, so tests can drive it
//! with a fake source and no network.
//!
//! # Retry Strategy
//!
//! Every request retries transient failures with exponential backoff:
//! - HTTP 429, 5xx, and 403 with `x-ratelimit-remaining: 0` or
//!   `retry-after` → retry
//! - Other HTTP 4xx → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Rate-limit responses wait at least as long as `retry-after` or
//! `x-ratelimit-reset` ask for. When that exceeds [`MAX_RATE_LIMIT_WAIT`]
//! the request fails at once: a rate-limited search aborts the run, and a
//! rate-limited detail or linked-issue lookup counts the event as failed
//! until the next run picks it up again.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use bug_squash_core::eligibility::{PullRequestAuthor, PullRequestDetail};

use crate::config::GitHubConfig;

/// GitHub's search API never returns more than this many results per page.
const SEARCH_PAGE_SIZE: usize = 100;

/// GitHub's search API serves at most this many results per query.
pub const SEARCH_RESULT_LIMIT: usize = 1000;

/// Longest rate-limit pause honoured before giving up on a request.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// A search hit: a merged pull request that may count as a bug fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    pub number: i64,
    pub title: String,
    pub url: String,
}

/// Source of candidate contribution events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Merged, bug-labelled pull requests merged within `[start, end]`.
    ///
    /// Returns a bounded list; pagination is handled by the implementation.
    async fn search_merged(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandidateEvent>>;

    /// Authoritative detail for one pull request.
    async fn pull_request(&self, number: i64) -> Result<PullRequestDetail>;

    /// Whether the pull request closes at least one issue.
    async fn closes_any_issue(&self, number: i64) -> Result<bool>;
}

/// [`EventSource`] backed by the GitHub API.
pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    label: String,
    max_results: usize,
    max_retries: u32,
    retry_base: Duration,
}

impl GitHubSource {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("bug-squash/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
            label: config.label.clone(),
            max_results: config.max_results,
            max_retries: config.max_retries,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Override the first backoff delay (later delays double from it).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// The search query sent to `/search/issues`.
    pub fn search_query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "repo:{}/{} is:pr is:merged label:\"{}\" merged:{}..{}",
            self.owner,
            self.repo,
            self.label,
            start.format("%Y-%m-%dT%H:%M:%SZ"),
            end.format("%Y-%m-%dT%H:%M:%SZ"),
        )
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Send the request built by `build`, retrying transient failures, and
    /// decode the JSON body.
    async fn send_json<T, F>(&self, what: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_err = None;
        let mut wait_hint: Option<Duration> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_base * (1u32 << (attempt - 1).min(5));
                let delay = wait_hint.take().map_or(backoff, |hint| hint.max(backoff));
                tracing::debug!(what, attempt, ?delay, "retrying GitHub request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.authorize(build()).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("Invalid GitHub response for {}", what));
                    }

                    let rate_wait =
                        rate_limit_wait(status, response.headers(), Utc::now().timestamp());
                    let body_text = response.text().await.unwrap_or_default();

                    if let Some(wait) = rate_wait {
                        if wait > MAX_RATE_LIMIT_WAIT {
                            bail!(
                                "GitHub rate limit exceeded ({}): retry in {}s: {}",
                                what,
                                wait.as_secs(),
                                body_text
                            );
                        }
                        wait_hint = Some(wait);
                    }

                    // Rate limited or server error, retry
                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                        || rate_wait.is_some()
                    {
                        last_err = Some(anyhow!("GitHub API error {} ({}): {}", status, what, body_text));
                        continue;
                    }

                    // Client error, no retry
                    bail!("GitHub API error {} ({}): {}", status, what, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::Error::new(e).context(format!("GitHub request failed ({})", what)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("GitHub request failed after retries ({})", what)))
    }
}

/// How long a rate-limited response asks the client to wait.
///
/// `None` when the response is not a rate-limit rejection. Secondary limits
/// carry `retry-after` (seconds); primary limits carry
/// `x-ratelimit-remaining: 0` and an `x-ratelimit-reset` epoch.
fn rate_limit_wait(status: StatusCode, headers: &HeaderMap, now: i64) -> Option<Duration> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    if header("x-ratelimit-remaining") == Some("0") {
        let reset = header("x-ratelimit-reset").and_then(|v| v.trim().parse::<i64>().ok());
        let secs = reset.map_or(0, |r| (r - now).max(0) as u64);
        return Some(Duration::from_secs(secs));
    }
    None
}

// ============ Wire types ============

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: i64,
    title: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
    login: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePullRequest {
    number: i64,
    title: String,
    html_url: String,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    author_association: String,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    changed_files: u64,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

impl From<WirePullRequest> for PullRequestDetail {
    fn from(pr: WirePullRequest) -> Self {
        PullRequestDetail {
            number: pr.number,
            title: pr.title,
            url: pr.html_url,
            author: pr.user.map(|u| PullRequestAuthor {
                external_id: u.id.to_string(),
                login: u.login,
                avatar_url: u.avatar_url.filter(|a| !a.is_empty()),
            }),
            author_association: pr.author_association,
            merged_at: pr.merged_at,
            changed_files: pr.changed_files,
            additions: pr.additions,
            deletions: pr.deletions,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

const CLOSING_ISSUES_QUERY: &str = r#"
query($owner: String!, $repo: String!, $prNumber: Int!) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $prNumber) {
      closingIssuesReferences(first: 1) {
        totalCount
      }
    }
  }
}
"#;

/// Extract `closingIssuesReferences.totalCount` from a GraphQL response.
fn parse_closing_count(resp: GraphQlResponse) -> Result<i64> {
    if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        bail!("GitHub GraphQL error: {}", messages.join("; "));
    }
    resp.data
        .as_ref()
        .and_then(|d| d.pointer("/repository/pullRequest/closingIssuesReferences/totalCount"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("Invalid GraphQL response: missing closingIssuesReferences"))
}

#[async_trait]
impl EventSource for GitHubSource {
    async fn search_merged(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CandidateEvent>> {
        let query = self.search_query(start, end);
        let url = format!("{}/search/issues", self.api_url);
        let limit = self.max_results.min(SEARCH_RESULT_LIMIT);
        let per_page = limit.min(SEARCH_PAGE_SIZE);
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for page in 1.. {
            let page_str = page.to_string();
            let per_page_str = per_page.to_string();
            let resp: SearchResponse = self
                .send_json("search", || {
                    self.client.get(&url).query(&[
                        ("q", query.as_str()),
                        ("sort", "updated"),
                        ("order", "asc"),
                        ("per_page", per_page_str.as_str()),
                        ("page", page_str.as_str()),
                    ])
                })
                .await?;

            let fetched = resp.items.len();
            for item in resp.items {
                // Results can shift between page requests.
                if seen.insert(item.number) {
                    events.push(CandidateEvent {
                        number: item.number,
                        title: item.title,
                        url: item.html_url,
                    });
                }
            }

            if fetched < per_page
                || events.len() >= limit
                || page * per_page >= SEARCH_RESULT_LIMIT
            {
                break;
            }
        }

        events.truncate(limit);
        tracing::info!(count = events.len(), %query, "found candidate pull requests");
        Ok(events)
    }

    async fn pull_request(&self, number: i64) -> Result<PullRequestDetail> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_url, self.owner, self.repo, number
        );
        let pr: WirePullRequest = self
            .send_json("pull request detail", || self.client.get(&url))
            .await?;
        Ok(pr.into())
    }

    async fn closes_any_issue(&self, number: i64) -> Result<bool> {
        let url = format!("{}/graphql", self.api_url);
        let body = serde_json::json!({
            "query": CLOSING_ISSUES_QUERY,
            "variables": {
                "owner": self.owner,
                "repo": self.repo,
                "prNumber": number,
            },
        });
        let resp: GraphQlResponse = self
            .send_json("linked issues", || self.client.post(&url).json(&body))
            .await?;
        Ok(parse_closing_count(resp)? > 0)
    }
}
