//! Daily sync schedule.
//!
//! Fires one sync per day at `schedule.daily_at` (UTC) for as long as the
//! server runs. A tick that lands while a manual sync is active is
//! rejected by the coordinator and logged; the next tick is unaffected.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::Arc;

use crate::sync::SyncCoordinator;

/// First instant strictly after `now` whose UTC wall-clock time is `at`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Run the daily loop. Never returns.
pub async fn run_daily(coordinator: Arc<SyncCoordinator>, at: NaiveTime) {
    loop {
        let now = Utc::now();
        let next = next_run_after(now, at);
        tracing::info!(next_run = %next.to_rfc3339(), "scheduled next GitHub sync");

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let outcome = coordinator.trigger().await;
        if outcome.success {
            tracing::info!(message = %outcome.message, "scheduled sync finished");
        } else {
            tracing::warn!(message = %outcome.message, "scheduled sync did not complete");
        }
    }
}
