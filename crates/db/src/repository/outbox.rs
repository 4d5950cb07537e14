//! Notification outbox repository functions.
//!
//! The outbox is backed by the `notification_outbox` Postgres table.
//! Workers poll the table and use `SELECT … FOR UPDATE SKIP LOCKED`
//! for safe concurrent processing.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{DbError, models::{NewOutboxEntry, OutboxRow}};

const OUTBOX_COLUMNS: &str = "id, update_id, channel, idempotency_key, payload, status, \
     attempts, max_attempts, last_error, created_at, updated_at";

/// Queue a delivery inside the caller's transaction.
///
/// The unique `idempotency_key` means a replayed submission cannot queue the
/// same delivery twice.
pub async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    update_id: Uuid,
    entry: &NewOutboxEntry,
) -> Result<(), DbError> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO notification_outbox
            (id, update_id, channel, idempotency_key, payload, status,
             attempts, max_attempts, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7, $7)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(update_id)
    .bind(&entry.channel)
    .bind(&entry.idempotency_key)
    .bind(&entry.payload)
    .bind(entry.max_attempts)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Atomically fetch the oldest claimable entry and mark it as `processing`.
///
/// Claimable means `pending`, or `processing` with `updated_at` at or before
/// `stale_before` (the claiming worker is presumed dead). Returns `None` if
/// nothing is claimable.
pub async fn fetch_next_entry(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
) -> Result<Option<OutboxRow>, DbError> {
    let mut tx = pool.begin().await?;

    let select = format!(
        "SELECT {OUTBOX_COLUMNS} FROM notification_outbox \
         WHERE status = 'pending' \
            OR (status = 'processing' AND updated_at <= $1) \
         ORDER BY created_at ASC \
         LIMIT 1 \
         FOR UPDATE SKIP LOCKED"
    );
    let row = sqlx::query_as::<_, OutboxRow>(&select)
        .bind(stale_before)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(mut entry) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE notification_outbox
        SET status = 'processing', attempts = attempts + 1, updated_at = $1
        WHERE id = $2
        "#,
    )
    .bind(now)
    .bind(entry.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    entry.status = "processing".into();
    entry.attempts += 1;
    entry.updated_at = now;
    Ok(Some(entry))
}

/// Mark an entry as delivered.
pub async fn mark_delivered(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE notification_outbox SET status = 'delivered', last_error = NULL, updated_at = $1 WHERE id = $2",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failed attempt: back to `pending`, or `dead_lettered` once
/// `attempts` reaches `max_attempts`. `terminal` dead-letters immediately.
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    terminal: bool,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE notification_outbox
        SET status = CASE WHEN $1 OR attempts >= max_attempts THEN 'dead_lettered' ELSE 'pending' END,
            last_error = $2,
            updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(terminal)
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
