//! Team membership operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::{MembershipRow, TeamMemberRow}};

/// Add an employee to a team.
///
/// The `(team_id, employee_id)` unique constraint surfaces as
/// `DbError::Conflict("unique_employee_team")`.
pub async fn add_member(
    pool: &PgPool,
    team_id: Uuid,
    employee_email: &str,
    employee_id: &str,
    display_name: &str,
) -> Result<TeamMemberRow, DbError> {
    let row = sqlx::query_as::<_, TeamMemberRow>(
        r#"
        INSERT INTO team_members (id, team_id, employee_email, employee_id, display_name, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, team_id, employee_email, employee_id, display_name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(employee_email)
    .bind(employee_id)
    .bind(display_name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// List members, optionally restricted to one team.
pub async fn list_members(
    pool: &PgPool,
    team_id: Option<Uuid>,
) -> Result<Vec<TeamMemberRow>, DbError> {
    let rows = sqlx::query_as::<_, TeamMemberRow>(
        r#"
        SELECT id, team_id, employee_email, employee_id, display_name, created_at
        FROM team_members
        WHERE ($1::uuid IS NULL OR team_id = $1)
        ORDER BY display_name ASC, created_at DESC
        "#,
    )
    .bind(team_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every membership of `email`, joined with its team (oldest first).
pub async fn memberships_for(pool: &PgPool, email: &str) -> Result<Vec<MembershipRow>, DbError> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        r#"
        SELECT m.id AS member_id, m.team_id, t.name AS team_name, t.manager_email,
               m.employee_email, m.employee_id, m.display_name
        FROM team_members m
        JOIN teams t ON t.id = m.team_id
        WHERE m.employee_email = $1
        ORDER BY m.created_at ASC
        "#,
    )
    .bind(email)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_member(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM team_members WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
