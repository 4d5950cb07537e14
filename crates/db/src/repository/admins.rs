//! `admins` table: the set of emails that resolve to the admin role.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use crate::{DbError, models::AdminRow};

/// Exact-match lookup by email.
pub async fn find_admin(pool: &PgPool, email: &str) -> Result<Option<AdminRow>, DbError> {
    let row = sqlx::query_as::<_, AdminRow>(
        "SELECT email, created_at FROM admins WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert an admin; a second insert for the same email is a no-op.
pub async fn upsert_admin(conn: &mut PgConnection, email: &str) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO admins (email, created_at)
        VALUES ($1, $2)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(email)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn delete_admin(conn: &mut PgConnection, email: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM admins WHERE email = $1")
        .bind(email)
        .execute(conn)
        .await?;
    Ok(())
}
