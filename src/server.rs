//! HTTP API for the leaderboard and sync triggers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/leaderboard?timeframe=day\|week\|all` | Cached rankings (default `all`) |
//! | `GET`, `POST` | `/api/github/sync` | Trigger an ingestion run |
//! | `POST` | `/api/leaderboard/refresh` | Rebuild the ranking cache only |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Request validation errors use the shared error body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid timeframe: 'month'. Must be day, week, or all." } }
//! ```
//!
//! Sync endpoints always answer with `{ "success": bool, "message": string }`:
//! `200` on success, `409` when a run is already in progress, `500` when the
//! run failed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser dashboard
//! on another origin can poll the leaderboard.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use bug_squash_core::models::Timeframe;

use crate::config::Config;
use crate::leaderboard::{get_leaderboard, LeaderboardEntry};
use crate::scheduler;
use crate::sync::{SyncCoordinator, SyncOutcome};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SyncCoordinator>,
}

/// Starts the HTTP server and, when enabled, the daily sync schedule.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let coordinator = Arc::new(SyncCoordinator::from_config(config).await?);

    if config.schedule.enabled {
        let at = config.schedule.time()?;
        tokio::spawn(scheduler::run_daily(coordinator.clone(), at));
    } else {
        tracing::info!("daily sync schedule disabled");
    }

    let app = router(AppState { coordinator });

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "leaderboard server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/leaderboard", get(handle_leaderboard))
        .route("/api/leaderboard/refresh", post(handle_refresh))
        .route("/api/github/sync", get(handle_sync).post(handle_sync))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/leaderboard ============

#[derive(Deserialize)]
struct LeaderboardParams {
    timeframe: Option<String>,
}

#[derive(Serialize)]
struct LeaderboardResponse {
    success: bool,
    data: Vec<LeaderboardEntry>,
}

/// Returns the cached rankings for the requested timeframe.
///
/// A missing `timeframe` means `all`; an unknown value or a malformed query
/// string is a `400`. Storage failures surface as an empty `data` list
/// rather than an error.
async fn handle_leaderboard(
    State(state): State<AppState>,
    query: Result<Query<LeaderboardParams>, QueryRejection>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let Query(params) = query.map_err(|rejection| bad_request(rejection.body_text()))?;
    let timeframe = match params.timeframe.as_deref() {
        None | Some("") => Timeframe::All,
        Some(raw) => raw
            .parse::<Timeframe>()
            .map_err(|e| bad_request(e.to_string()))?,
    };

    let data = get_leaderboard(state.coordinator.store().as_ref(), timeframe).await;
    Ok(Json(LeaderboardResponse {
        success: true,
        data,
    }))
}

// ============ /api/github/sync ============

fn outcome_response(outcome: SyncOutcome) -> Response {
    let status = if outcome.success {
        StatusCode::OK
    } else if outcome.busy {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome)).into_response()
}

async fn handle_sync(State(state): State<AppState>) -> Response {
    outcome_response(state.coordinator.trigger().await)
}

// ============ POST /api/leaderboard/refresh ============

async fn handle_refresh(State(state): State<AppState>) -> Response {
    outcome_response(state.coordinator.refresh_rankings().await)
}
