//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models; they carry no domain behaviour.
//! Enumerated columns (`role`, `status`, `blocker_type`, `channel`) stay as
//! plain strings here; the `standup` crate parses them into domain enums.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// admins
// ---------------------------------------------------------------------------

/// An email that resolves to the admin role.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminRow {
    pub email: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// teams / team_members
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamRow {
    pub id: Uuid,
    pub name: String,
    pub manager_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamMemberRow {
    pub id: Uuid,
    pub team_id: Uuid,
    pub employee_email: String,
    pub employee_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A membership joined with its team, used to build the cached profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipRow {
    pub member_id: Uuid,
    pub team_id: Uuid,
    pub team_name: String,
    pub manager_email: String,
    pub employee_email: String,
    pub employee_id: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// user_roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRoleRow {
    pub id: Uuid,
    pub user_email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// daily_updates / update_blockers
// ---------------------------------------------------------------------------

/// A persisted daily update (the parent of zero or more blockers).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyUpdateRow {
    pub id: Uuid,
    pub employee_name: String,
    pub employee_id: String,
    pub employee_email: String,
    pub team_id: Uuid,
    pub tasks_completed: String,
    pub status: String,
    pub additional_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockerRow {
    pub id: Uuid,
    pub update_id: Uuid,
    pub blocker_type: String,
    pub description: String,
    pub expected_resolution_date: NaiveDate,
    pub position: i32,
}

/// One row of the flattened read view: an update LEFT JOINed with its
/// blockers and team. Blocker columns are `None` for updates without any.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UpdateViewRow {
    pub update_id: Uuid,
    pub employee_name: String,
    pub employee_id: String,
    pub employee_email: String,
    pub team_id: Uuid,
    pub team_name: Option<String>,
    pub tasks_completed: String,
    pub status: String,
    pub additional_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub blocker_id: Option<Uuid>,
    pub blocker_type: Option<String>,
    pub blocker_description: Option<String>,
    pub expected_resolution_date: Option<NaiveDate>,
}

/// Insert payload for `daily_updates`.
#[derive(Debug, Clone)]
pub struct NewDailyUpdate {
    pub id: Uuid,
    pub employee_name: String,
    pub employee_id: String,
    pub employee_email: String,
    pub team_id: Uuid,
    pub tasks_completed: String,
    pub status: String,
    pub additional_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `update_blockers`.
#[derive(Debug, Clone)]
pub struct NewBlocker {
    pub id: Uuid,
    pub blocker_type: String,
    pub description: String,
    pub expected_resolution_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// notification_outbox
// ---------------------------------------------------------------------------

/// Possible statuses for an outbox entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Delivered,
    DeadLettered,
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending      => write!(f, "pending"),
            Self::Processing   => write!(f, "processing"),
            Self::Delivered    => write!(f, "delivered"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

/// An outbox entry fetched by the notification worker.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxRow {
    pub id: Uuid,
    pub update_id: Uuid,
    pub channel: String,
    pub idempotency_key: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for `notification_outbox`.
#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub channel: String,
    pub idempotency_key: String,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
}
