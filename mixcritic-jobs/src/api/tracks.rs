//! Track endpoints
//!
//! GET/DELETE /tracks/:id, GET /tracks/:id/reviews, GET/POST /tracks/:id/jobs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db,
    error::{ApiError, ApiResult},
    models::{Job, JobOptions, JobType, Review, Track},
    AppState,
};

/// POST /tracks/:id/jobs request
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: JobType,
    #[serde(default)]
    pub options: JobOptions,
}

/// GET /tracks/:id
pub async fn get_track(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
) -> ApiResult<Json<Track>> {
    let track = db::tracks::get_track(&state.db, track_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("track {}", track_id)))?;
    Ok(Json(track))
}

/// DELETE /tracks/:id
///
/// Removes the track with its jobs, analyses and reviews. Refused with 409
/// while a job is active.
pub async fn delete_track(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.jobs.delete_track(track_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /tracks/:id/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Review>>> {
    if db::tracks::get_track(&state.db, track_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("track {}", track_id)));
    }
    let reviews = db::reviews::list_track_reviews(&state.db, track_id).await?;
    Ok(Json(reviews))
}

/// GET /tracks/:id/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Job>>> {
    let jobs = state.jobs.get_track_jobs(track_id).await?;
    Ok(Json(jobs))
}

/// POST /tracks/:id/jobs
///
/// Returns 202 with the queued job; poll the project's jobs for progress.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Path(track_id): Path<Uuid>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = state
        .jobs
        .enqueue(track_id, request.job_type, request.options)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /reviews/:id
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
) -> ApiResult<Json<Review>> {
    let review = db::reviews::get_review(&state.db, review_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("review {}", review_id)))?;
    Ok(Json(review))
}

/// Build track routes
pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route("/tracks/:id", get(get_track).delete(delete_track))
        .route("/tracks/:id/reviews", get(list_reviews))
        .route("/reviews/:id", get(get_review))
        .route("/tracks/:id/jobs", get(list_jobs).post(enqueue_job))
}
