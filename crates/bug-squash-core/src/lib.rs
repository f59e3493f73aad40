//! # Bug Squash Core
//!
//! Shared logic for Bug Squash: competition data models, the eligibility
//! filter, complexity classification, the ranking algorithm, and the store
//! abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Storage backends and the GitHub event source live in the `bug-squash`
//! application crate.

pub mod eligibility;
pub mod models;
pub mod ranking;
pub mod store;
