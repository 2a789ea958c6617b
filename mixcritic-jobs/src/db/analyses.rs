//! Analysis store: append-only audio features per track

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use mixcritic_common::{time, Result};

use super::{parse_json, parse_uuid, parse_uuid_opt, to_json};
use crate::models::TrackAnalysis;

fn analysis_from_row(row: &SqliteRow) -> Result<TrackAnalysis> {
    Ok(TrackAnalysis {
        id: parse_uuid("id", row.get("id"))?,
        track_id: parse_uuid("track_id", row.get("track_id"))?,
        job_id: parse_uuid_opt("job_id", row.get("job_id"))?,
        features: parse_json("features", row.get("features"))?,
        created_at: time::from_db(row.get("created_at"))?,
    })
}

/// Insert an analysis row (called inside a transition transaction)
pub async fn insert_analysis(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    job_id: Uuid,
    features: &serde_json::Value,
) -> Result<TrackAnalysis> {
    let analysis = TrackAnalysis {
        id: Uuid::new_v4(),
        track_id,
        job_id: Some(job_id),
        features: features.clone(),
        created_at: time::now(),
    };

    sqlx::query(
        "INSERT INTO track_analyses (id, track_id, job_id, features, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(analysis.id.to_string())
    .bind(track_id.to_string())
    .bind(job_id.to_string())
    .bind(to_json("features", features)?)
    .bind(time::to_db(analysis.created_at))
    .execute(conn)
    .await?;

    Ok(analysis)
}

/// Most recent analysis of a track
pub async fn latest_analysis(pool: &SqlitePool, track_id: Uuid) -> Result<Option<TrackAnalysis>> {
    let row = sqlx::query(
        r#"
        SELECT id, track_id, job_id, features, created_at
        FROM track_analyses
        WHERE track_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(track_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(analysis_from_row).transpose()
}

pub async fn has_analysis(pool: &SqlitePool, track_id: Uuid) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM track_analyses WHERE track_id = ? LIMIT 1")
        .bind(track_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}
