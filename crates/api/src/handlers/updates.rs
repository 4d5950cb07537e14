use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use standup::dashboard::{DashboardView, DateRange, USER_DEFAULT_DAYS};
use standup::models::DailyUpdate;
use standup::{StandupError, SubmitRequest};

use super::query_date;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

/// The update is always filed under the caller's own email.
pub async fn submit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut payload): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<DailyUpdate>), ApiError> {
    payload.bind_submitter(&user.email).map_err(StandupError::from)?;
    let update = state.submissions.submit(&payload).await?;
    Ok((StatusCode::CREATED, Json(update)))
}

#[derive(Deserialize, Default)]
pub struct MineParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// The caller's own rows, last 30 days unless a range is given.
pub async fn mine(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<MineParams>,
) -> Result<Json<DashboardView>, ApiError> {
    let default = DateRange::last_days(Utc::now().date_naive(), USER_DEFAULT_DAYS);
    let range = DateRange {
        start: query_date("start", params.start.as_deref())?.unwrap_or(default.start),
        end: query_date("end", params.end.as_deref())?.unwrap_or(default.end),
    };
    Ok(Json(state.dashboard.my_updates(&user.email, range).await?))
}
