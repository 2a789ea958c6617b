//! Project endpoints
//!
//! POST /projects, GET /projects/:id, GET/POST /projects/:id/tracks,
//! GET /projects/:id/reviews

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    db,
    error::{ApiError, ApiResult},
    models::{NewProject, NewTrack, Project, Review, Track},
    AppState,
};

/// POST /projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("project name must not be empty".to_string()));
    }

    let project = db::projects::insert_project(&state.db, name).await?;
    tracing::info!(project_id = %project.id, name = %project.name, "Project created");

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let project = load_project(&state, project_id).await?;
    Ok(Json(project))
}

/// GET /projects/:id/tracks
pub async fn list_tracks(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Track>>> {
    load_project(&state, project_id).await?;
    let tracks = db::tracks::list_project_tracks(&state.db, project_id).await?;
    Ok(Json(tracks))
}

/// POST /projects/:id/tracks
///
/// Register an uploaded track. The audio itself is already in storage;
/// the body carries its metadata and `audio_url`.
pub async fn register_track(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<NewTrack>,
) -> ApiResult<(StatusCode, Json<Track>)> {
    load_project(&state, project_id).await?;
    let track = db::tracks::insert_track(&state.db, project_id, &request).await?;
    Ok((StatusCode::CREATED, Json(track)))
}

/// GET /projects/:id/reviews
///
/// Album reviews of the project, oldest version first.
pub async fn list_album_reviews(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Review>>> {
    load_project(&state, project_id).await?;
    let reviews = db::reviews::list_album_reviews(&state.db, project_id).await?;
    Ok(Json(reviews))
}

async fn load_project(state: &AppState, project_id: Uuid) -> ApiResult<Project> {
    db::projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {}", project_id)))
}

/// Build project routes
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/tracks", get(list_tracks).post(register_track))
        .route("/projects/:id/reviews", get(list_album_reviews))
}
