//! Job record store
//!
//! Inserts happen inside the enqueue transaction owned by
//! `workflow::transitions`; everything else here is a read.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use mixcritic_common::{time, Result};

use super::{parse_enum, parse_json, parse_uuid, parse_uuid_opt, to_json};
use crate::models::{Job, JobStatus, TrackStatus};

pub(crate) const JOB_COLUMNS: &str = "id, project_id, track_id, job_type, status, progress, progress_message, \
     error_message, options, resume_status, retried_from, created_at, started_at, finished_at";

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let progress: i64 = row.get("progress");
    let resume_status: Option<String> = row.get("resume_status");

    Ok(Job {
        id: parse_uuid("id", row.get("id"))?,
        project_id: parse_uuid("project_id", row.get("project_id"))?,
        track_id: parse_uuid_opt("track_id", row.get("track_id"))?,
        job_type: parse_enum("job_type", row.get("job_type"))?,
        status: parse_enum("status", row.get("status"))?,
        progress: progress.clamp(0, 100) as u8,
        progress_message: row.get("progress_message"),
        error_message: row.get("error_message"),
        options: parse_json("options", row.get("options"))?,
        resume_status: resume_status
            .as_deref()
            .map(|s| parse_enum::<TrackStatus>("resume_status", s))
            .transpose()?,
        retried_from: parse_uuid_opt("retried_from", row.get("retried_from"))?,
        created_at: time::from_db(row.get("created_at"))?,
        started_at: time::from_db_opt(row.get("started_at"))?,
        finished_at: time::from_db_opt(row.get("finished_at"))?,
    })
}

/// Insert a freshly queued job
///
/// Fails with a unique violation when the track (or project, for
/// project-level jobs) already has an active job.
pub async fn insert_job(conn: &mut SqliteConnection, job: &Job) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, project_id, track_id, job_type, status, progress, progress_message,
            error_message, options, resume_status, retried_from, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.to_string())
    .bind(job.project_id.to_string())
    .bind(job.track_id.map(|id| id.to_string()))
    .bind(job.job_type.as_str())
    .bind(job.status.as_str())
    .bind(job.progress as i64)
    .bind(&job.progress_message)
    .bind(&job.error_message)
    .bind(to_json("options", &job.options)?)
    .bind(job.resume_status.map(|s| s.as_str()))
    .bind(job.retried_from.map(|id| id.to_string()))
    .bind(time::to_db(job.created_at))
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<Job>> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// All jobs of a project, newest first
pub async fn list_project_jobs(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Job>> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE project_id = ? ORDER BY created_at DESC, rowid DESC",
        JOB_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Job history of a track in issue order
pub async fn list_track_jobs(pool: &SqlitePool, track_id: Uuid) -> Result<Vec<Job>> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE track_id = ? ORDER BY created_at, rowid",
        JOB_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(track_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Jobs in one status, oldest first
pub async fn list_jobs_by_status(pool: &SqlitePool, status: JobStatus) -> Result<Vec<Job>> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE status = ? ORDER BY created_at, rowid",
        JOB_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Running jobs claimed before `cutoff`
pub async fn list_running_started_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Job>> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE status = 'running' AND started_at < ? ORDER BY started_at, rowid",
        JOB_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(time::to_db(cutoff))
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}
