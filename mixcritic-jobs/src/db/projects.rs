//! Project database operations

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use mixcritic_common::{time, Result};

use super::parse_uuid;
use crate::models::Project;

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: parse_uuid("id", row.get("id"))?,
        name: row.get("name"),
        created_at: time::from_db(row.get("created_at"))?,
    })
}

pub async fn insert_project(pool: &SqlitePool, name: &str) -> Result<Project> {
    let project = Project {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: time::now(),
    };

    sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, ?)")
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(time::to_db(project.created_at))
        .execute(pool)
        .await?;

    Ok(project)
}

pub async fn get_project(pool: &SqlitePool, project_id: Uuid) -> Result<Option<Project>> {
    let row = sqlx::query("SELECT id, name, created_at FROM projects WHERE id = ?")
        .bind(project_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(project_from_row).transpose()
}
