use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use standup::models::{Role, Team, TeamMember};
use standup::teams::CreateTeamRequest;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

const MANAGERS: &[Role] = &[Role::Manager, Role::Admin];

#[derive(Deserialize, Default)]
pub struct ListParams {
    #[serde(default)]
    pub mine: bool,
}

/// All teams, or with `?mine=true` the teams offered on the caller's form.
pub async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Team>>, ApiError> {
    let teams = if params.mine {
        state.teams.form_teams(&user.0.email).await?
    } else {
        state.teams.list_teams().await?
    };
    Ok(Json(teams))
}

pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), ApiError> {
    user.require(MANAGERS)?;
    let team = state.teams.create_team(&payload).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require(&[Role::Admin])?;
    state.teams.delete_team(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TeamMember>>, ApiError> {
    user.require(MANAGERS)?;
    state.store.get_team(id).await?;
    Ok(Json(state.teams.list_members(Some(id)).await?))
}
