//! Track database operations
//!
//! Status columns are written by `workflow::transitions`; this module only
//! inserts, reads and deletes track rows.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use mixcritic_common::{time, Error, Result};

use super::{parse_enum, parse_uuid, parse_uuid_opt};
use crate::models::{NewTrack, Track, TrackStatus};

const TRACK_COLUMNS: &str = "id, project_id, filename, file_size, duration, mime_type, audio_url, \
     status, version_number, parent_track_id, created_at, updated_at";

pub(crate) fn track_from_row(row: &SqliteRow) -> Result<Track> {
    Ok(Track {
        id: parse_uuid("id", row.get("id"))?,
        project_id: parse_uuid("project_id", row.get("project_id"))?,
        filename: row.get("filename"),
        file_size: row.get("file_size"),
        duration: row.get("duration"),
        mime_type: row.get("mime_type"),
        audio_url: row.get("audio_url"),
        status: parse_enum("status", row.get("status"))?,
        version_number: row.get("version_number"),
        parent_track_id: parse_uuid_opt("parent_track_id", row.get("parent_track_id"))?,
        created_at: time::from_db(row.get("created_at"))?,
        updated_at: time::from_db(row.get("updated_at"))?,
    })
}

/// Register an uploaded track in `uploaded` status
///
/// A track with a parent continues the parent's version chain; the parent
/// must belong to the same project.
pub async fn insert_track(pool: &SqlitePool, project_id: Uuid, new_track: &NewTrack) -> Result<Track> {
    new_track.validate().map_err(Error::InvalidInput)?;

    let version_number = match new_track.parent_track_id {
        Some(parent_id) => {
            let parent = get_track(pool, parent_id)
                .await?
                .ok_or_else(|| Error::InvalidInput(format!("Parent track {} not found", parent_id)))?;
            if parent.project_id != project_id {
                return Err(Error::InvalidInput(format!(
                    "Parent track {} belongs to another project",
                    parent_id
                )));
            }
            parent.version_number + 1
        }
        None => 1,
    };

    let now = time::now();
    let track = Track {
        id: Uuid::new_v4(),
        project_id,
        filename: new_track.filename.clone(),
        file_size: new_track.file_size,
        duration: new_track.duration,
        mime_type: new_track.mime_type.clone(),
        audio_url: new_track.audio_url.clone(),
        status: TrackStatus::Uploaded,
        version_number,
        parent_track_id: new_track.parent_track_id,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO tracks (
            id, project_id, filename, file_size, duration, mime_type, audio_url,
            status, version_number, parent_track_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(track.id.to_string())
    .bind(track.project_id.to_string())
    .bind(&track.filename)
    .bind(track.file_size)
    .bind(track.duration)
    .bind(&track.mime_type)
    .bind(&track.audio_url)
    .bind(track.status.as_str())
    .bind(track.version_number)
    .bind(track.parent_track_id.map(|id| id.to_string()))
    .bind(time::to_db(track.created_at))
    .bind(time::to_db(track.updated_at))
    .execute(pool)
    .await?;

    tracing::debug!(track_id = %track.id, project_id = %project_id, version = version_number, "Registered track");

    Ok(track)
}

pub async fn get_track(pool: &SqlitePool, track_id: Uuid) -> Result<Option<Track>> {
    let sql = format!("SELECT {} FROM tracks WHERE id = ?", TRACK_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(track_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(track_from_row).transpose()
}

/// Tracks of a project in upload order
pub async fn list_project_tracks(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Track>> {
    let sql = format!(
        "SELECT {} FROM tracks WHERE project_id = ? ORDER BY created_at, rowid",
        TRACK_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(track_from_row).collect()
}

/// Outcome of [`delete_idle_track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// A job is queued or running for the track
    Busy,
}

/// Delete a track unless a job is active for it
///
/// The activity check and the delete are one statement, so a job enqueued
/// concurrently either blocks the delete or fails its own foreign key.
pub async fn delete_idle_track(pool: &SqlitePool, track_id: Uuid) -> Result<DeleteOutcome> {
    let id = track_id.to_string();
    let result = sqlx::query(
        r#"
        DELETE FROM tracks
        WHERE id = ?
          AND NOT EXISTS (
              SELECT 1 FROM jobs WHERE track_id = ? AND status IN ('queued', 'running')
          )
        "#,
    )
    .bind(&id)
    .bind(&id)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        tracing::info!(track_id = %track_id, "Deleted track");
        return Ok(DeleteOutcome::Deleted);
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tracks WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await?;

    Ok(if exists.is_some() {
        DeleteOutcome::Busy
    } else {
        DeleteOutcome::NotFound
    })
}
