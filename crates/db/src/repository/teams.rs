//! Team CRUD operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::TeamRow};

/// Insert a new team.
///
/// Returns `DbError::Conflict` when the name is already taken.
pub async fn create_team(
    pool: &PgPool,
    name: &str,
    manager_email: &str,
) -> Result<TeamRow, DbError> {
    let row = sqlx::query_as::<_, TeamRow>(
        r#"
        INSERT INTO teams (id, name, manager_email, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, manager_email, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(manager_email)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_team(pool: &PgPool, id: Uuid) -> Result<TeamRow, DbError> {
    sqlx::query_as::<_, TeamRow>(
        "SELECT id, name, manager_email, created_at FROM teams WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Return all teams ordered by name.
pub async fn list_teams(pool: &PgPool) -> Result<Vec<TeamRow>, DbError> {
    let rows = sqlx::query_as::<_, TeamRow>(
        "SELECT id, name, manager_email, created_at FROM teams ORDER BY name ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Teams whose `manager_email` equals `email`.
pub async fn teams_managed_by(pool: &PgPool, email: &str) -> Result<Vec<TeamRow>, DbError> {
    let rows = sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, name, manager_email, created_at
        FROM teams
        WHERE manager_email = $1
        ORDER BY name ASC
        "#,
    )
    .bind(email)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Teams with the given ids, ordered by name.
pub async fn teams_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<TeamRow>, DbError> {
    let rows = sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, name, manager_email, created_at
        FROM teams
        WHERE id = ANY($1)
        ORDER BY name ASC
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete a team (memberships cascade).
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_team(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM teams WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
