//! Single-flight sync coordination.
//!
//! Every trigger (CLI, HTTP, daily scheduler) goes through a
//! [`SyncCoordinator`]. It owns the explicitly constructed store and event
//! source handles and an exclusive run lock: a trigger that arrives while
//! a run holds the lock is rejected immediately rather than queued, so two
//! runs never interleave writes to the contribution or snapshot tables.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use bug_squash_core::ranking::rebuild_rankings;
use bug_squash_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::github::{EventSource, GitHubSource};
use crate::ingest::{run_ingestion, IngestSettings};
use crate::sqlite_store::SqliteStore;

/// Result of a trigger, as returned to the caller.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    /// Set when the trigger was rejected because a run was in flight.
    #[serde(skip)]
    pub busy: bool,
}

impl SyncOutcome {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
            busy: false,
        }
    }

    fn failed(err: &anyhow::Error) -> Self {
        Self {
            success: false,
            message: format!("Error: {:#}", err),
            busy: false,
        }
    }

    fn busy() -> Self {
        Self {
            success: false,
            message: "sync already in progress".to_string(),
            busy: true,
        }
    }
}

/// Serializes ingestion runs and ranking refreshes.
pub struct SyncCoordinator {
    source: Arc<dyn EventSource>,
    store: Arc<dyn Store>,
    settings: IngestSettings,
    run_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn Store>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    /// Build a coordinator over the configured SQLite database and GitHub
    /// repository.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let source = GitHubSource::new(&config.github)?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(SqliteStore::new(pool)),
            IngestSettings::from_config(config),
        ))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run ingestion plus ranking rebuild, unless a run is already active.
    pub async fn trigger(&self) -> SyncOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::warn!("sync requested while another run is in progress");
            return SyncOutcome::busy();
        };

        tracing::info!("starting GitHub sync");
        match run_ingestion(
            self.source.as_ref(),
            self.store.as_ref(),
            &self.settings,
            Utc::now,
        )
        .await
        {
            Ok(report) => SyncOutcome::ok(report.summary()),
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "GitHub sync failed");
                SyncOutcome::failed(&e)
            }
        }
    }

    /// Rebuild the ranking cache without ingesting.
    pub async fn refresh_rankings(&self) -> SyncOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return SyncOutcome::busy();
        };

        match rebuild_rankings(self.store.as_ref(), self.settings.start, Utc::now()).await {
            Ok(report) => {
                tracing::info!(rows = report.total_rows(), "ranking cache rebuilt");
                SyncOutcome::ok("Leaderboard cache updated successfully".to_string())
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "ranking rebuild failed");
                SyncOutcome::failed(&e)
            }
        }
    }
}

/// `squash sync`: run one ingestion pass and print the outcome.
pub async fn run_sync(config: &Config) -> anyhow::Result<()> {
    let coordinator = SyncCoordinator::from_config(config).await?;
    let outcome = coordinator.trigger().await;
    if !outcome.success {
        anyhow::bail!(
            "sync failed: {}",
            outcome.message.trim_start_matches("Error: ")
        );
    }
    println!("{}", outcome.message);
    Ok(())
}

/// `squash rank`: rebuild the ranking cache from stored contributions.
pub async fn run_rank(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let report = rebuild_rankings(&store, config.competition.start_date, Utc::now()).await?;
    pool.close().await;

    println!("Ranking cache rebuilt:");
    for (timeframe, rows) in &report.rows {
        println!("  {:<5} {} contributors", timeframe.as_str(), rows);
    }
    Ok(())
}
