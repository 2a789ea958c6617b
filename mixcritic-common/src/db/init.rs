//! Database initialization
//!
//! Opens (or creates) the SQLite database and applies the schema.

use crate::db::schema;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection pool and create tables if needed
///
/// Every pooled connection gets foreign keys, WAL journaling and a busy
/// timeout; these are per-connection settings in SQLite, so they are applied
/// through the connect options rather than a one-off PRAGMA.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for statement in schema::TABLES.iter().chain(schema::INDEXES.iter()) {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::debug!("Database schema ready (projects, tracks, jobs, track_analyses, reviews)");
    Ok(())
}
