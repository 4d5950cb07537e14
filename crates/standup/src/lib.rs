//! `standup` crate: domain models, validation and the services behind the
//! daily standup API and its terminal client.

pub mod models;
pub mod error;
pub mod validation;
pub mod store;
pub mod auth;
pub mod storage;
pub mod session;
pub mod roles;
pub mod draft;
pub mod submission;
pub mod dashboard;
pub mod csv;
pub mod access;
pub mod teams;
pub mod admin;
pub mod dispatch;

pub use models::{CachedUser, DailyUpdate, Role, Status, BlockerType, Team, TeamMember, UpdateRow};
pub use error::StandupError;
pub use store::{Store, MemoryStore, PgStore};
pub use session::{SessionConfig, SessionManager, SessionStatus};
pub use draft::DraftEditor;
pub use submission::{SubmissionService, SubmitRequest};
pub use dashboard::{DashboardFilter, DashboardService, DateRange, Stats, Tab};
pub use teams::TeamService;
pub use admin::AdminService;
pub use dispatch::{DispatchConfig, OutboxDispatcher};

#[cfg(test)]
mod session_tests;
