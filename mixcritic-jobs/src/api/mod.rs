//! HTTP API handlers for mixcritic-jobs
//!
//! Thin adapters over `workflow::JobService` and the read-side `db`
//! modules. Job progress is exposed two ways: the polling view on
//! `GET /projects/:id/jobs` and the SSE stream on `GET /jobs/events`.

pub mod health;
pub mod jobs;
pub mod projects;
pub mod sse;
pub mod tracks;

pub use health::health_routes;
pub use jobs::job_routes;
pub use projects::project_routes;
pub use sse::job_event_stream;
pub use tracks::track_routes;

use axum::Json;
use serde::Deserialize;

use crate::models::JobOptions;

/// Request body carrying only job options
#[derive(Debug, Default, Deserialize)]
pub struct OptionsRequest {
    #[serde(default)]
    pub options: JobOptions,
}

/// Options from an optional JSON body
pub(crate) fn options_or_default(body: Option<Json<OptionsRequest>>) -> JobOptions {
    body.map(|Json(request)| request.options).unwrap_or_default()
}
