use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use standup::models::{Role, TeamMember};
use standup::teams::AddMemberRequest;

use super::query_uuid;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

const MANAGERS: &[Role] = &[Role::Manager, Role::Admin];

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub team_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TeamMember>>, ApiError> {
    user.require(MANAGERS)?;
    let team_id = query_uuid("team_id", params.team_id.as_deref())?;
    Ok(Json(state.teams.list_members(team_id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<TeamMember>), ApiError> {
    user.require(MANAGERS)?;
    let member = state.teams.add_member(&payload).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require(MANAGERS)?;
    state.teams.remove_member(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
