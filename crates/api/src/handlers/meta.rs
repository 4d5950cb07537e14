use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use standup::access::{authorize, Access};
use standup::models::CachedUser;

use crate::auth::{CurrentUser, MaybeUser};
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        }
    }
}

/// Profile the client caches.
pub async fn me(CurrentUser(user): CurrentUser) -> Json<CachedUser> {
    Json(user)
}

#[derive(Deserialize)]
pub struct AccessParams {
    pub path: String,
}

pub async fn access(MaybeUser(user): MaybeUser, Query(params): Query<AccessParams>) -> Json<Access> {
    Json(authorize(&params.path, user.map(|u| u.role)))
}
