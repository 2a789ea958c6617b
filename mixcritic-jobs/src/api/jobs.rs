//! Job endpoints
//!
//! GET /projects/:id/jobs (polling view), POST /projects/:id/album-review,
//! POST /projects/:id/review-all, GET /jobs/:id, POST /jobs/:id/retry,
//! GET /jobs/events (SSE)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::{options_or_default, OptionsRequest};
use crate::{
    error::ApiResult,
    models::{BatchResult, Job, JobType},
    AppState,
};

/// GET /projects/:id/jobs response
///
/// `poll_interval_ms` is present only while a job is queued or running;
/// clients stop polling when it disappears.
#[derive(Debug, Serialize)]
pub struct ProjectJobsResponse {
    pub project_id: Uuid,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    pub jobs: Vec<Job>,
}

/// GET /projects/:id/jobs
pub async fn project_jobs(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectJobsResponse>> {
    let jobs = state.jobs.get_jobs(project_id).await?;
    let next_poll = state.polling.next_poll(&jobs);

    Ok(Json(ProjectJobsResponse {
        project_id,
        active: next_poll.is_some(),
        poll_interval_ms: next_poll.map(|interval| interval.as_millis() as u64),
        jobs,
    }))
}

/// POST /projects/:id/album-review
pub async fn enqueue_album_review(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    body: Option<Json<OptionsRequest>>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = state
        .jobs
        .enqueue_project(project_id, JobType::AlbumReview, options_or_default(body))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// POST /projects/:id/review-all
///
/// Always 200 once the project exists: refused tracks are reported in the
/// body, not as an error.
pub async fn review_all(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    body: Option<Json<OptionsRequest>>,
) -> ApiResult<Json<BatchResult>> {
    let result = state
        .jobs
        .batch_review_all(project_id, options_or_default(body))
        .await?;
    Ok(Json(result))
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.jobs.get_job(job_id).await?))
}

/// POST /jobs/:id/retry
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = state.jobs.retry(job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/jobs", get(project_jobs))
        .route("/projects/:id/album-review", post(enqueue_album_review))
        .route("/projects/:id/review-all", post(review_all))
        .route("/jobs/events", get(super::job_event_stream))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/retry", post(retry_job))
}
