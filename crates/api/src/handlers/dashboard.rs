use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use standup::dashboard::{DashboardFilter, DashboardView, DateRange, Tab};
use standup::models::Role;

use super::{query_date, query_uuid};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

const MANAGERS: &[Role] = &[Role::Manager, Role::Admin];

#[derive(Deserialize, Default)]
pub struct DashboardParams {
    pub team_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub tab: Option<String>,
}

impl DashboardParams {
    fn filter(&self) -> Result<DashboardFilter, ApiError> {
        let default = DashboardFilter::manager_default(Utc::now().date_naive());
        let tab = match self.tab.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            None => Tab::All,
            Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
        };
        Ok(DashboardFilter {
            range: DateRange {
                start: query_date("start", self.start.as_deref())?.unwrap_or(default.range.start),
                end: query_date("end", self.end.as_deref())?.unwrap_or(default.range.end),
            },
            team_id: query_uuid("team_id", self.team_id.as_deref())?,
            tab,
        })
    }
}

pub async fn view(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<DashboardParams>,
) -> Result<Json<DashboardView>, ApiError> {
    user.require(MANAGERS)?;
    let filter = params.filter()?;
    Ok(Json(state.dashboard.dashboard(&filter, Utc::now()).await?))
}

/// Same filters as the dashboard, rendered as a CSV attachment.
pub async fn export(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<DashboardParams>,
) -> Result<Response, ApiError> {
    user.require(MANAGERS)?;
    let filter = params.filter()?;
    let now = Utc::now();
    let view = state.dashboard.dashboard(&filter, now).await?;

    let body = standup::csv::export(&view.rows);
    let disposition = format!(
        "attachment; filename=\"{}\"",
        standup::csv::export_filename(now.date_naive())
    );
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
