//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database does not answer
    pub status: String,
    /// Module name ("mixcritic-jobs")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Connected SSE clients
    pub event_subscribers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (status, last_error) = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => ("ok", None),
        Err(e) => {
            tracing::warn!(error = %e, "Health check database ping failed");
            ("degraded", Some(e.to_string()))
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "mixcritic-jobs".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        event_subscribers: state.event_bus.subscriber_count(),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
