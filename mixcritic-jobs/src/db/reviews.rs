//! Review store: immutable, versioned critiques
//!
//! `review_version` is computed by the INSERT itself, so the read of the
//! current maximum and the write happen under the same write lock.

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use mixcritic_common::{time, Result};

use super::{parse_enum, parse_json, parse_uuid, parse_uuid_opt, to_json};
use crate::models::{Review, ReviewDraft, ReviewType};

const REVIEW_COLUMNS: &str = "id, project_id, track_id, job_id, review_type, compared_track_id, \
     scores, review_markdown, quick_take, review_version, created_at";

fn review_from_row(row: &SqliteRow) -> Result<Review> {
    Ok(Review {
        id: parse_uuid("id", row.get("id"))?,
        project_id: parse_uuid("project_id", row.get("project_id"))?,
        track_id: parse_uuid_opt("track_id", row.get("track_id"))?,
        job_id: parse_uuid_opt("job_id", row.get("job_id"))?,
        review_type: parse_enum("review_type", row.get("review_type"))?,
        compared_track_id: parse_uuid_opt("compared_track_id", row.get("compared_track_id"))?,
        scores: parse_json("scores", row.get("scores"))?,
        review_markdown: row.get("review_markdown"),
        quick_take: row.get("quick_take"),
        review_version: row.get("review_version"),
        created_at: time::from_db(row.get("created_at"))?,
    })
}

/// Fields of a review row other than the generated ones
#[derive(Debug, Clone)]
pub struct ReviewInsert<'a> {
    pub project_id: Uuid,
    /// `None` for album reviews
    pub track_id: Option<Uuid>,
    pub job_id: Uuid,
    pub review_type: ReviewType,
    pub compared_track_id: Option<Uuid>,
    pub draft: &'a ReviewDraft,
}

/// Insert a review with the next version number for its scope
pub async fn insert_review(conn: &mut SqliteConnection, insert: ReviewInsert<'_>) -> Result<Review> {
    let id = Uuid::new_v4();
    let created_at = time::now();
    let scores = to_json("scores", &insert.draft.scores)?;

    // `track_id IS ?3` matches NULL too: album reviews are versioned per project.
    let review_version: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO reviews (
            id, project_id, track_id, job_id, review_type, compared_track_id,
            scores, review_markdown, quick_take, review_version, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
            (SELECT COALESCE(MAX(review_version), 0) + 1 FROM reviews
             WHERE project_id = ?2 AND track_id IS ?3 AND review_type = ?5),
            ?10
        )
        RETURNING review_version
        "#,
    )
    .bind(id.to_string())
    .bind(insert.project_id.to_string())
    .bind(insert.track_id.map(|id| id.to_string()))
    .bind(insert.job_id.to_string())
    .bind(insert.review_type.as_str())
    .bind(insert.compared_track_id.map(|id| id.to_string()))
    .bind(&scores)
    .bind(&insert.draft.review_markdown)
    .bind(&insert.draft.quick_take)
    .bind(time::to_db(created_at))
    .fetch_one(conn)
    .await?;

    Ok(Review {
        id,
        project_id: insert.project_id,
        track_id: insert.track_id,
        job_id: Some(insert.job_id),
        review_type: insert.review_type,
        compared_track_id: insert.compared_track_id,
        scores: insert.draft.scores.clone(),
        review_markdown: insert.draft.review_markdown.clone(),
        quick_take: insert.draft.quick_take.clone(),
        review_version,
        created_at,
    })
}

pub async fn get_review(pool: &SqlitePool, review_id: Uuid) -> Result<Option<Review>> {
    let sql = format!("SELECT {} FROM reviews WHERE id = ?", REVIEW_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(review_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(review_from_row).transpose()
}

/// All reviews of a track, oldest version first
pub async fn list_track_reviews(pool: &SqlitePool, track_id: Uuid) -> Result<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE track_id = ? ORDER BY review_type, review_version",
        REVIEW_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(track_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(review_from_row).collect()
}

/// Album reviews of a project, oldest version first
pub async fn list_album_reviews(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE project_id = ? AND track_id IS NULL AND review_type = 'album' \
         ORDER BY review_version",
        REVIEW_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(review_from_row).collect()
}

/// Latest track review of a track
pub async fn latest_track_review(pool: &SqlitePool, track_id: Uuid) -> Result<Option<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE track_id = ? AND review_type = 'track' \
         ORDER BY review_version DESC LIMIT 1",
        REVIEW_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(track_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(review_from_row).transpose()
}

/// Latest track review of every reviewed track in a project, in upload order
pub async fn latest_track_reviews_in_project(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Review>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.project_id, r.track_id, r.job_id, r.review_type, r.compared_track_id,
               r.scores, r.review_markdown, r.quick_take, r.review_version, r.created_at
        FROM reviews r
        JOIN tracks t ON t.id = r.track_id
        WHERE r.project_id = ?
          AND r.review_type = 'track'
          AND r.review_version = (
              SELECT MAX(r2.review_version) FROM reviews r2
              WHERE r2.track_id = r.track_id AND r2.review_type = 'track'
          )
        ORDER BY t.created_at, t.rowid
        "#,
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(review_from_row).collect()
}

/// Number of tracks in a project with at least one track review
pub async fn count_reviewed_tracks(pool: &SqlitePool, project_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT track_id) FROM reviews WHERE project_id = ? AND review_type = 'track'",
    )
    .bind(project_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}
