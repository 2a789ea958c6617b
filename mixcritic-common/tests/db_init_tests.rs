//! Database initialization tests
//!
//! Schema creation, idempotence, and the constraints the job pipeline relies on.

use mixcritic_common::db::{create_schema, init_database};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn open_temp_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("mixcritic.db");
    let pool = init_database(&db_path).await.expect("init_database failed");
    (temp_dir, pool)
}

async fn seed_track(pool: &SqlitePool, project_id: &str, track_id: &str) {
    sqlx::query("INSERT OR IGNORE INTO projects (id, name, created_at) VALUES (?, 'Demo', '2026-01-01T00:00:00.000000Z')")
        .bind(project_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        r#"INSERT INTO tracks (id, project_id, filename, file_size, mime_type, audio_url, created_at, updated_at)
           VALUES (?, ?, 'song.wav', 1024, 'audio/wav', 'https://blobs/song.wav',
                   '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')"#,
    )
    .bind(track_id)
    .bind(project_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn insert_job(pool: &SqlitePool, id: &str, project_id: &str, track_id: Option<&str>, status: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO jobs (id, project_id, track_id, job_type, status, created_at)
           VALUES (?, ?, ?, 'analyze', ?, '2026-01-01T00:00:00.000000Z')"#,
    )
    .bind(id)
    .bind(project_id)
    .bind(track_id)
    .bind(status)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_creates_database_file_and_tables() {
    let (temp_dir, pool) = open_temp_db().await;
    assert!(temp_dir.path().join("nested").join("mixcritic.db").exists());

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in ["jobs", "projects", "reviews", "track_analyses", "tracks"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let (_temp_dir, pool) = open_temp_db().await;
    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let (_temp_dir, pool) = open_temp_db().await;
    let result = insert_job(&pool, "j1", "no-such-project", None, "queued").await;
    assert!(result.is_err(), "job for unknown project must be rejected");
}

#[tokio::test]
async fn test_one_active_job_per_track() {
    let (_temp_dir, pool) = open_temp_db().await;
    seed_track(&pool, "p1", "t1").await;

    insert_job(&pool, "j1", "p1", Some("t1"), "queued").await.unwrap();
    let err = insert_job(&pool, "j2", "p1", Some("t1"), "queued").await.unwrap_err();
    assert!(err.as_database_error().map(|e| e.is_unique_violation()).unwrap_or(false));

    // Terminal jobs do not count toward the limit
    insert_job(&pool, "j3", "p1", Some("t1"), "complete").await.unwrap();
    insert_job(&pool, "j4", "p1", Some("t1"), "error").await.unwrap();
}

#[tokio::test]
async fn test_one_active_project_level_job() {
    let (_temp_dir, pool) = open_temp_db().await;
    seed_track(&pool, "p1", "t1").await;

    insert_job(&pool, "a1", "p1", None, "running").await.unwrap();
    assert!(insert_job(&pool, "a2", "p1", None, "queued").await.is_err());

    // Track-level jobs in the same project are independent
    insert_job(&pool, "j1", "p1", Some("t1"), "queued").await.unwrap();
}

#[tokio::test]
async fn test_deleting_track_cascades_jobs() {
    let (_temp_dir, pool) = open_temp_db().await;
    seed_track(&pool, "p1", "t1").await;
    insert_job(&pool, "j1", "p1", Some("t1"), "complete").await.unwrap();

    sqlx::query("DELETE FROM tracks WHERE id = 't1'").execute(&pool).await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}
