//! # Bug Squash
//!
//! Ingestion and ranking engine for a bug-fixing competition.
//!
//! Bug Squash pulls merged, bug-labelled pull requests from a GitHub
//! repository, keeps the ones that close an issue and come from outside
//! contributors, awards points per fix, and maintains a cached ranking of
//! contributors over three windows (`day`, `week`, `all`). The ranking is
//! served through a CLI and a small JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   GitHub    │──▶│  Ingestion   │──▶│    SQLite    │
//! │ search/GQL  │   │ filter+score │   │ contributions│
//! └─────────────┘   └──────┬───────┘   └──────┬───────┘
//!                          │ rebuild          │
//!                          ▼                  ▼
//!                   ┌──────────────┐   ┌──────────────┐
//!                   │ rank_snapshots│◀──│   Ranking    │
//!                   └──────┬───────┘   └──────────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!         ┌──────────┐           ┌──────────┐
//!         │   CLI    │           │   HTTP   │
//!         │ (squash) │           │  (axum)  │
//!         └──────────┘           └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`github`] | GitHub event source (REST search + GraphQL) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`sync`] | Single-flight run coordination |
//! | [`scheduler`] | Daily sync trigger |
//! | [`leaderboard`] | Leaderboard query facade |
//! | [`server`] | HTTP API |
//! | [`stats`] | Database statistics |

pub mod config;
pub mod db;
pub mod github;
pub mod ingest;
pub mod leaderboard;
pub mod migrate;
pub mod scheduler;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod sync;

pub use bug_squash_core;
