//! Bearer-token extractors.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use standup::auth::{bearer_token, AuthError};
use standup::models::{CachedUser, Role};
use standup::roles::resolve_profile;
use standup::StandupError;

use crate::error::ApiError;
use crate::AppState;

const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// The authenticated caller with role and team resolved.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub CachedUser);

/// Like [`CurrentUser`], but a missing or rejected token yields `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CachedUser>);

impl CurrentUser {
    /// Forbid callers whose role is not in `allowed`.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.0.role) {
            return Ok(());
        }
        let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
        Err(StandupError::Forbidden(format!("requires role {}", names.join(" or "))).into())
    }
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<CachedUser, ApiError> {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(StandupError::Unauthenticated)?;

    let identity = tokio::time::timeout(VERIFY_TIMEOUT, state.verifier.verify(token))
        .await
        .map_err(|_| AuthError::Unavailable("token verification timed out".into()))??;

    let user = resolve_profile(state.store.as_ref(), &identity).await?;
    debug!(email = %user.email, role = %user.role, "authenticated request");
    Ok(user)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(CurrentUser)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(ApiError::Domain(StandupError::Unauthenticated | StandupError::Auth(_))) => Ok(MaybeUser(None)),
            Err(other) => Err(other),
        }
    }
}
