//! The `Store` trait: every persistence operation the services need.
//!
//! [`PgStore`] backs it with the `db` crate's repositories; [`MemoryStore`]
//! keeps everything in process for tests and local experiments.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    DailyUpdate, Membership, NewOutboxJob, NewSubmission, OutboxJob, Role, Team, TeamMember,
    UpdateRow, UserRoleRecord,
};
use crate::StandupError;

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Query-level restrictions for the update row view. `None` = unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateQuery {
    pub team_id: Option<Uuid>,
    pub employee_email: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Input for a new team member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeamMember {
    pub team_id: Uuid,
    pub employee_email: String,
    pub employee_id: String,
    pub display_name: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap liveness check.
    async fn ping(&self) -> Result<(), StandupError>;

    // ------ roles ------

    async fn is_admin(&self, email: &str) -> Result<bool, StandupError>;

    async fn teams_managed_by(&self, email: &str) -> Result<Vec<Team>, StandupError>;

    /// Return the directory row for `email`, creating it with `default_role`.
    async fn ensure_user_role(
        &self,
        email: &str,
        default_role: Role,
    ) -> Result<UserRoleRecord, StandupError>;

    /// All directory rows, newest first.
    async fn list_user_roles(&self) -> Result<Vec<UserRoleRecord>, StandupError>;

    /// Change a role and keep the admins set in step with it.
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<UserRoleRecord, StandupError>;

    // ------ teams ------

    /// Conflict when the name is taken.
    async fn create_team(&self, name: &str, manager_email: &str) -> Result<Team, StandupError>;

    async fn get_team(&self, id: Uuid) -> Result<Team, StandupError>;

    /// All teams ordered by name.
    async fn list_teams(&self) -> Result<Vec<Team>, StandupError>;

    async fn teams_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Team>, StandupError>;

    async fn delete_team(&self, id: Uuid) -> Result<(), StandupError>;

    /// Conflict when `(team_id, employee_id)` already exists.
    async fn add_member(&self, member: NewTeamMember) -> Result<TeamMember, StandupError>;

    async fn list_members(&self, team_id: Option<Uuid>) -> Result<Vec<TeamMember>, StandupError>;

    /// Memberships of `email`, oldest first.
    async fn memberships_for(&self, email: &str) -> Result<Vec<Membership>, StandupError>;

    async fn remove_member(&self, id: Uuid) -> Result<(), StandupError>;

    // ------ updates ------

    /// Write the update, its blockers and its outbox jobs atomically.
    async fn insert_submission(
        &self,
        submission: &NewSubmission,
        created_at: DateTime<Utc>,
        update_id: Uuid,
        outbox: Vec<NewOutboxJob>,
    ) -> Result<DailyUpdate, StandupError>;

    /// Flattened rows, newest first.
    async fn list_update_rows(&self, query: &UpdateQuery) -> Result<Vec<UpdateRow>, StandupError>;

    // ------ outbox ------

    /// Claim the oldest job that is pending, or `processing` with a claim
    /// older than `lease`, incrementing its attempt count.
    async fn claim_outbox_job(&self, lease: Duration) -> Result<Option<OutboxJob>, StandupError>;

    async fn complete_outbox_job(&self, id: Uuid) -> Result<(), StandupError>;

    /// Requeue, or dead-letter when `terminal` or attempts are exhausted.
    async fn fail_outbox_job(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
    ) -> Result<(), StandupError>;
}
