//! Daily update repository functions.
//!
//! An update, its blockers, and the outbox entries announcing it are written
//! in a single transaction: either every row commits or none does.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::{
    DbError,
    models::{DailyUpdateRow, NewBlocker, NewDailyUpdate, NewOutboxEntry, UpdateViewRow},
    repository::outbox,
};

/// Filters applied at the query level. `None` means "no restriction".
#[derive(Debug, Clone, Default)]
pub struct UpdateQuery {
    pub team_id: Option<Uuid>,
    pub employee_email: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Insert an update with its blockers and outbox entries atomically.
pub async fn insert_update(
    pool: &PgPool,
    update: &NewDailyUpdate,
    blockers: &[NewBlocker],
    notifications: &[NewOutboxEntry],
) -> Result<DailyUpdateRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, DailyUpdateRow>(
        r#"
        INSERT INTO daily_updates
            (id, employee_name, employee_id, employee_email, team_id,
             tasks_completed, status, additional_notes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, employee_name, employee_id, employee_email, team_id,
                  tasks_completed, status, additional_notes, created_at
        "#,
    )
    .bind(update.id)
    .bind(&update.employee_name)
    .bind(&update.employee_id)
    .bind(&update.employee_email)
    .bind(update.team_id)
    .bind(&update.tasks_completed)
    .bind(&update.status)
    .bind(&update.additional_notes)
    .bind(update.created_at)
    .fetch_one(&mut *tx)
    .await?;

    for (position, blocker) in blockers.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO update_blockers
                (id, update_id, blocker_type, description, expected_resolution_date, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(blocker.id)
        .bind(row.id)
        .bind(&blocker.blocker_type)
        .bind(&blocker.description)
        .bind(blocker.expected_resolution_date)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    for entry in notifications {
        outbox::insert_entry(&mut tx, row.id, entry).await?;
    }

    tx.commit().await?;
    debug!(
        update_id = %row.id,
        blockers = blockers.len(),
        notifications = notifications.len(),
        "daily update committed"
    );

    Ok(row)
}

/// Fetch the flattened view (one row per blocker), newest first.
pub async fn list_update_rows(
    pool: &PgPool,
    query: &UpdateQuery,
) -> Result<Vec<UpdateViewRow>, DbError> {
    let rows = sqlx::query_as::<_, UpdateViewRow>(
        r#"
        SELECT u.id AS update_id, u.employee_name, u.employee_id, u.employee_email,
               u.team_id, t.name AS team_name, u.tasks_completed, u.status,
               u.additional_notes, u.created_at,
               b.id AS blocker_id, b.blocker_type, b.description AS blocker_description,
               b.expected_resolution_date
        FROM daily_updates u
        LEFT JOIN teams t ON t.id = u.team_id
        LEFT JOIN update_blockers b ON b.update_id = u.id
        WHERE ($1::uuid IS NULL OR u.team_id = $1)
          AND ($2::text IS NULL OR u.employee_email = $2)
          AND ($3::timestamptz IS NULL OR u.created_at >= $3)
          AND ($4::timestamptz IS NULL OR u.created_at <= $4)
        ORDER BY u.created_at DESC, b.position ASC
        "#,
    )
    .bind(query.team_id)
    .bind(&query.employee_email)
    .bind(query.created_from)
    .bind(query.created_to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
