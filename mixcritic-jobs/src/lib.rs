//! mixcritic-jobs library interface
//!
//! Background job pipeline that turns uploaded tracks into critiques:
//! enqueue, process against the critique service, surface progress to
//! polling clients. Exposed as a library for integration testing; the
//! binary wires it to configuration and an HTTP listener.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, JobError, JobResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use mixcritic_common::events::EventBus;
use workflow::{JobService, PollingPolicy};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Enqueue/retry entry point
    pub jobs: Arc<JobService>,
    /// Interval advertised to polling clients
    pub polling: PollingPolicy,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(jobs: Arc<JobService>, polling: PollingPolicy) -> Self {
        let transitions = jobs.transitions();
        Self {
            db: transitions.pool().clone(),
            event_bus: transitions.event_bus().clone(),
            jobs,
            polling,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::project_routes())
        .merge(api::track_routes())
        .merge(api::job_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
