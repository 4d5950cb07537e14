//! `api` crate: HTTP REST layer over the standup services.
//!
//! Every `/api` route takes `Authorization: Bearer <access token>`; the token
//! is verified with the hosted auth provider and the caller's role resolved
//! on each request.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use notify::Channel;
use standup::auth::TokenVerifier;
use standup::{AdminService, DashboardService, Store, SubmissionService, TeamService};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub submissions: Arc<SubmissionService>,
    pub dashboard: Arc<DashboardService>,
    pub teams: Arc<TeamService>,
    pub admin: Arc<AdminService>,
}

impl AppState {
    /// `channels` are the notification channels queued on every submission.
    pub fn new(
        store: Arc<dyn Store>,
        verifier: Arc<dyn TokenVerifier>,
        channels: Vec<Channel>,
        max_attempts: i32,
    ) -> Self {
        Self {
            submissions: Arc::new(SubmissionService::new(store.clone(), channels, max_attempts)),
            dashboard: Arc::new(DashboardService::new(store.clone())),
            teams: Arc::new(TeamService::new(store.clone())),
            admin: Arc::new(AdminService::new(store.clone())),
            store,
            verifier,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    use handlers::{admin, dashboard, members, meta, teams, updates};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(meta::health))
        .route("/api/me", get(meta::me))
        .route("/api/access", get(meta::access))
        // Teams
        .route("/api/teams", get(teams::list).post(teams::create))
        .route("/api/teams/:id", delete(teams::delete))
        .route("/api/teams/:id/members", get(teams::members))
        // Members
        .route("/api/members", get(members::list).post(members::create))
        .route("/api/members/:id", delete(members::delete))
        // Updates
        .route("/api/updates", post(updates::submit))
        .route("/api/updates/mine", get(updates::mine))
        // Dashboard
        .route("/api/dashboard", get(dashboard::view))
        .route("/api/dashboard/export.csv", get(dashboard::export))
        // Admin
        .route("/api/admin/users", get(admin::users))
        .route("/api/admin/users/:id/role", put(admin::set_role))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}
