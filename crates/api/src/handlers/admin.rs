use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use standup::admin::UserDirectory;
use standup::models::{Role, UserRoleRecord};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

pub async fn users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserDirectory>, ApiError> {
    user.require(&[Role::Admin])?;
    Ok(Json(state.admin.directory().await?))
}

#[derive(Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

pub async fn set_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(change): Json<RoleChange>,
) -> Result<Json<UserRoleRecord>, ApiError> {
    user.require(&[Role::Admin])?;
    Ok(Json(state.admin.set_role(id, change.role).await?))
}
