use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use standup::auth::AuthError;
use standup::session::SIGN_IN_PATH;
use standup::StandupError;

/// Unified error type for HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] StandupError),

    /// Malformed query or path input that never reached the domain.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Domain(err.into())
    }
}

fn unauthenticated(message: String) -> Response {
    let body = json!({ "error": message, "redirect": SIGN_IN_PATH });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::BadRequest(msg) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response();
            }
            Self::Domain(err) => err,
        };

        let status = match &err {
            StandupError::Validation(fields) => {
                let body = json!({ "error": "validation failed", "fields": fields });
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
            }
            StandupError::Unauthenticated | StandupError::Auth(AuthError::InvalidSession(_)) => {
                return unauthenticated(err.to_string());
            }
            StandupError::NotFound(_) => StatusCode::NOT_FOUND,
            StandupError::Conflict(_) => StatusCode::CONFLICT,
            StandupError::Forbidden(_) => StatusCode::FORBIDDEN,
            StandupError::Auth(AuthError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            StandupError::InvalidData(_)
            | StandupError::Database(_)
            | StandupError::Storage(_)
            | StandupError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}
