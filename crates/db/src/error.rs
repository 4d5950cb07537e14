//! Typed error type for the db crate.

use thiserror::Error;

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("conflict on constraint {0}")]
    Conflict(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db_err.constraint().unwrap_or("unknown").to_owned();
                return Self::Conflict(constraint);
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return Self::NotFound;
        }
        Self::Sqlx(err)
    }
}
