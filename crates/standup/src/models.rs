//! Core domain models for the standup service.
//!
//! These types are the source of truth for what an update, a team or a
//! signed-in user looks like in memory. The `db` crate's row structs are
//! converted into them by the Postgres store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use notify::{BlockerLine, Channel, SubmissionSummary};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Access level of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User    => "user",
            Self::Manager => "manager",
            Self::Admin   => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user"    => Ok(Self::User),
            "manager" => Ok(Self::Manager),
            "admin"   => Ok(Self::Admin),
            other     => Err(format!("unknown role: {other}")),
        }
    }
}

/// Progress of the work reported in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "blocked")]
    Blocked,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed  => "completed",
            Self::Blocked    => "blocked",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(Self::InProgress),
            "completed"   => Ok(Self::Completed),
            "blocked"     => Ok(Self::Blocked),
            other         => Err(format!("unknown status: {other}")),
        }
    }
}

/// Kind of obstacle attached to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockerType {
    Blockers,
    Risks,
    Dependencies,
}

impl BlockerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blockers     => "Blockers",
            Self::Risks        => "Risks",
            Self::Dependencies => "Dependencies",
        }
    }
}

impl std::fmt::Display for BlockerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BlockerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Blockers"     => Ok(Self::Blockers),
            "Risks"        => Ok(Self::Risks),
            "Dependencies" => Ok(Self::Dependencies),
            other          => Err(format!("unknown blocker type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub manager_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub employee_email: String,
    pub employee_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A member record joined with the team it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub member_id: Uuid,
    pub team_id: Uuid,
    pub team_name: String,
    pub manager_email: String,
    pub employee_email: String,
    pub employee_id: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Entry of the admin panel's user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleRecord {
    pub id: Uuid,
    pub user_email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The profile a client keeps in its local cache.
///
/// `last_checked` is milliseconds since the Unix epoch of the last successful
/// validation against the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
}

// ---------------------------------------------------------------------------
// Daily updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub id: Uuid,
    pub blocker_type: BlockerType,
    pub description: String,
    pub expected_resolution_date: NaiveDate,
}

/// A validated blocker waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlocker {
    pub blocker_type: BlockerType,
    pub description: String,
    pub expected_resolution_date: NaiveDate,
}

/// A validated submission waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub employee_name: String,
    pub employee_id: String,
    pub employee_email: String,
    pub team_id: Uuid,
    pub tasks_completed: String,
    pub status: Status,
    pub additional_notes: Option<String>,
    pub blockers: Vec<NewBlocker>,
}

/// A persisted update and its blockers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUpdate {
    pub id: Uuid,
    pub employee_name: String,
    pub employee_id: String,
    pub employee_email: String,
    pub team_id: Uuid,
    pub tasks_completed: String,
    pub status: Status,
    pub additional_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub blockers: Vec<Blocker>,
}

/// One row of the flattened dashboard view.
///
/// An update with N blockers yields N rows sharing every non-blocker field;
/// an update without blockers yields one row whose blocker fields are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRow {
    /// Blocker id for blocker rows, update id otherwise.
    pub id: Uuid,
    pub update_id: Uuid,
    pub employee_name: String,
    pub employee_id: String,
    pub employee_email: String,
    pub team_id: Uuid,
    pub team_name: Option<String>,
    pub tasks_completed: String,
    pub status: Status,
    pub blocker_type: Option<BlockerType>,
    pub blocker_description: Option<String>,
    pub expected_resolution_date: Option<NaiveDate>,
    pub additional_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DailyUpdate {
    /// Flatten into the dashboard row view.
    pub fn rows(&self, team_name: Option<&str>) -> Vec<UpdateRow> {
        let base = |id: Uuid| UpdateRow {
            id,
            update_id: self.id,
            employee_name: self.employee_name.clone(),
            employee_id: self.employee_id.clone(),
            employee_email: self.employee_email.clone(),
            team_id: self.team_id,
            team_name: team_name.map(str::to_owned),
            tasks_completed: self.tasks_completed.clone(),
            status: self.status,
            blocker_type: None,
            blocker_description: None,
            expected_resolution_date: None,
            additional_notes: self.additional_notes.clone(),
            created_at: self.created_at,
        };

        if self.blockers.is_empty() {
            return vec![base(self.id)];
        }

        self.blockers
            .iter()
            .map(|blocker| UpdateRow {
                blocker_type: Some(blocker.blocker_type),
                blocker_description: Some(blocker.description.clone()),
                expected_resolution_date: Some(blocker.expected_resolution_date),
                ..base(blocker.id)
            })
            .collect()
    }
}

impl NewSubmission {
    /// Payload carried by the notification outbox entries of this submission.
    pub fn summary(&self, team: &Team, update_id: Uuid, submitted_at: DateTime<Utc>) -> SubmissionSummary {
        SubmissionSummary {
            update_id,
            employee_name: self.employee_name.clone(),
            employee_email: self.employee_email.clone(),
            employee_id: self.employee_id.clone(),
            team_name: team.name.clone(),
            manager_email: Some(team.manager_email.clone()).filter(|m| !m.is_empty()),
            tasks_completed: self.tasks_completed.clone(),
            status: self.status.to_string(),
            blockers: self
                .blockers
                .iter()
                .map(|b| BlockerLine {
                    blocker_type: b.blocker_type.to_string(),
                    description: b.description.clone(),
                    expected_resolution_date: b.expected_resolution_date.to_string(),
                })
                .collect(),
            additional_notes: self.additional_notes.clone(),
            submitted_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification outbox
// ---------------------------------------------------------------------------

/// A delivery to queue alongside a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxJob {
    pub channel: Channel,
    pub idempotency_key: String,
    pub summary: SubmissionSummary,
    pub max_attempts: i32,
}

/// A delivery claimed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxJob {
    pub id: Uuid,
    pub update_id: Uuid,
    pub channel: Channel,
    pub idempotency_key: String,
    pub summary: SubmissionSummary,
    pub attempts: i32,
    pub max_attempts: i32,
}
