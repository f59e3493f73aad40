//! TOML configuration parsing and validation.
//!
//! The configuration file (default `./config/squash.toml`) is parsed with
//! `serde` + `toml`. After parsing, a fixed set of environment variables
//! override individual values so deployments can keep secrets such as the
//! GitHub token out of the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `GITHUB_TOKEN` | `github.token` |
//! | `GITHUB_OWNER` | `github.owner` |
//! | `GITHUB_REPO` | `github.repo` |
//! | `DATABASE_PATH` | `db.path` |
//! | `COMPETITION_START_DATE` | `competition.start_date` |
//! | `COMPETITION_END_DATE` | `competition.end_date` |
//! | `POINTS_PER_BUG` | `competition.points_per_bug` |

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use bug_squash_core::eligibility::DEFAULT_BOTS;

use crate::github::SEARCH_RESULT_LIMIT;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub github: GitHubConfig,
    pub competition: CompetitionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Label that marks a pull request as a bug fix.
    #[serde(default = "default_label")]
    pub label: String,
    /// Upper bound on search results consumed per run.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_bots")]
    pub bots: Vec<String>,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_label() -> String {
    "bug".to_string()
}
fn default_max_results() -> usize {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_bots() -> Vec<String> {
    DEFAULT_BOTS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompetitionConfig {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_points_per_bug")]
    pub points_per_bug: i64,
}

fn default_points_per_bug() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,
    /// Daily sync time, `HH:MM` in UTC.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            daily_at: default_daily_at(),
        }
    }
}

fn default_schedule_enabled() -> bool {
    true
}
fn default_daily_at() -> String {
    "00:00".to_string()
}

impl ScheduleConfig {
    pub fn time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M").with_context(|| {
            format!(
                "schedule.daily_at must be HH:MM, got '{}'",
                self.daily_at
            )
        })
    }
}

/// Read, override from the environment, and validate the config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;

    Ok(config)
}

/// Parse and validate a config document without consulting the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment-style overrides, reading each variable through `lookup`.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
        config.github.token = Some(token);
    }
    if let Some(owner) = lookup("GITHUB_OWNER") {
        config.github.owner = owner;
    }
    if let Some(repo) = lookup("GITHUB_REPO") {
        config.github.repo = repo;
    }
    if let Some(path) = lookup("DATABASE_PATH") {
        config.db.path = PathBuf::from(path);
    }
    if let Some(start) = lookup("COMPETITION_START_DATE") {
        config.competition.start_date = parse_timestamp("COMPETITION_START_DATE", &start)?;
    }
    if let Some(end) = lookup("COMPETITION_END_DATE") {
        config.competition.end_date = parse_timestamp("COMPETITION_END_DATE", &end)?;
    }
    if let Some(points) = lookup("POINTS_PER_BUG") {
        config.competition.points_per_bug = points
            .trim()
            .parse()
            .with_context(|| format!("POINTS_PER_BUG must be an integer, got '{}'", points))?;
    }
    Ok(())
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{} must be an ISO-8601 timestamp, got '{}'", name, value))
}

fn validate(config: &Config) -> Result<()> {
    if config.github.owner.trim().is_empty() {
        bail!("github.owner must not be empty");
    }
    if config.github.repo.trim().is_empty() {
        bail!("github.repo must not be empty");
    }
    if config.github.max_results == 0 || config.github.max_results > SEARCH_RESULT_LIMIT {
        bail!(
            "github.max_results must be between 1 and {} (GitHub search limit)",
            SEARCH_RESULT_LIMIT
        );
    }
    if config.github.timeout_secs == 0 {
        bail!("github.timeout_secs must be >= 1");
    }
    if config.competition.start_date >= config.competition.end_date {
        bail!("competition.start_date must be before competition.end_date");
    }
    if config.competition.points_per_bug < 0 {
        bail!("competition.points_per_bug must be >= 0");
    }
    config.schedule.time()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[db]
path = "./data/squash.sqlite"

[github]
owner = "actualbudget"
repo = "actual"

[competition]
start_date = "2025-03-24T00:00:00Z"
end_date = "2025-04-24T23:59:59Z"
"#;

    #[test]
    fn test_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.github.api_url, "https://api.github.com");
        assert_eq!(cfg.github.label, "bug");
        assert_eq!(cfg.github.max_results, 100);
        assert_eq!(cfg.github.max_retries, 3);
        assert!(cfg.github.token.is_none());
        assert!(cfg.github.bots.iter().any(|b| b == "dependabot[bot]"));
        assert_eq!(cfg.competition.points_per_bug, 10);
        assert_eq!(cfg.server.bind, "127.0.0.1:3000");
        assert!(cfg.schedule.enabled);
        assert_eq!(
            cfg.schedule.time().unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rejects_inverted_window() {
        let doc = MINIMAL.replace("2025-04-24T23:59:59Z", "2025-03-01T00:00:00Z");
        let err = parse_config(&doc).unwrap_err();
        assert!(err.to_string().contains("start_date"));
    }

    #[test]
    fn test_rejects_bad_schedule() {
        let doc = format!("{}\n[schedule]\ndaily_at = \"25:99\"\n", MINIMAL);
        assert!(parse_config(&doc).is_err());
    }

    #[test]
    fn test_rejects_max_results_beyond_search_limit() {
        let ok = MINIMAL.replace("repo = \"actual\"", "repo = \"actual\"\nmax_results = 1000");
        assert_eq!(parse_config(&ok).unwrap().github.max_results, 1000);

        let doc = MINIMAL.replace("repo = \"actual\"", "repo = \"actual\"\nmax_results = 1500");
        let err = parse_config(&doc).unwrap_err();
        assert!(err.to_string().contains("max_results"));
    }

    #[test]
    fn test_rejects_empty_repo() {
        let doc = MINIMAL.replace("repo = \"actual\"", "repo = \"\"");
        assert!(parse_config(&doc).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = parse_config(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = [
            ("GITHUB_TOKEN", "ghp_test"),
            ("GITHUB_REPO", "other"),
            ("DATABASE_PATH", "/tmp/x.sqlite"),
            ("COMPETITION_START_DATE", "2025-03-25T00:00:00+02:00"),
            ("POINTS_PER_BUG", "25"),
        ]
        .into_iter()
        .collect();
        apply_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.github.token.as_deref(), Some("ghp_test"));
        assert_eq!(cfg.github.owner, "actualbudget");
        assert_eq!(cfg.github.repo, "other");
        assert_eq!(cfg.db.path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(
            cfg.competition.start_date.to_rfc3339(),
            "2025-03-24T22:00:00+00:00"
        );
        assert_eq!(cfg.competition.points_per_bug, 25);
    }

    #[test]
    fn test_env_override_rejects_bad_values() {
        let mut cfg = parse_config(MINIMAL).unwrap();
        assert!(apply_overrides(&mut cfg, |k| {
            (k == "POINTS_PER_BUG").then(|| "ten".to_string())
        })
        .is_err());
        assert!(apply_overrides(&mut cfg, |k| {
            (k == "COMPETITION_END_DATE").then(|| "next tuesday".to_string())
        })
        .is_err());
    }
}
