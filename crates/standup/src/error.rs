//! Domain-level error types.

use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::StorageError;
use crate::validation::ValidationErrors;

/// Errors produced by the standup services.
#[derive(Debug, Error)]
pub enum StandupError {
    // ------ Caller errors ------

    /// One or more fields failed validation; nothing was written.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness rule rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("not signed in")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    // ------ Backend errors ------

    /// A stored value could not be parsed into its domain type.
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ValidationErrors> for StandupError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
