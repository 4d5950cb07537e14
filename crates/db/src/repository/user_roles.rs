//! `user_roles` table: the directory of known users shown in the admin panel.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbError, models::UserRoleRow};

/// Return the row for `email`, creating it with `default_role` on first sight.
pub async fn ensure_user_role(
    pool: &PgPool,
    email: &str,
    default_role: &str,
) -> Result<UserRoleRow, DbError> {
    sqlx::query(
        r#"
        INSERT INTO user_roles (id, user_email, role, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(default_role)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, UserRoleRow>(
        "SELECT id, user_email, role, created_at FROM user_roles WHERE user_email = $1",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All users, newest first.
pub async fn list_user_roles(pool: &PgPool) -> Result<Vec<UserRoleRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRoleRow>(
        "SELECT id, user_email, role, created_at FROM user_roles ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Change a user's role inside the caller's transaction.
pub async fn update_role(
    conn: &mut PgConnection,
    id: Uuid,
    role: &str,
) -> Result<UserRoleRow, DbError> {
    sqlx::query_as::<_, UserRoleRow>(
        r#"
        UPDATE user_roles SET role = $1
        WHERE id = $2
        RETURNING id, user_email, role, created_at
        "#,
    )
    .bind(role)
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(DbError::NotFound)
}

/// Change a user's role and keep `admins` in step: granting `admin` inserts
/// the email, any other role removes it. Both writes share one transaction.
pub async fn set_role(pool: &PgPool, id: Uuid, role: &str) -> Result<UserRoleRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = update_role(&mut tx, id, role).await?;
    if role == "admin" {
        crate::repository::admins::upsert_admin(&mut tx, &row.user_email).await?;
    } else {
        crate::repository::admins::delete_admin(&mut tx, &row.user_email).await?;
    }

    tx.commit().await?;
    Ok(row)
}
