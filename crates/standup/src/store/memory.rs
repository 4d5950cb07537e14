//! In-process [`Store`] used by tests and local experiments.
//!
//! Mirrors the Postgres constraints that the services rely on: unique team
//! names, unique `(team_id, employee_id)`, unique user emails, the team
//! foreign key on updates, and the all-or-nothing submission write.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Blocker, DailyUpdate, Membership, NewOutboxJob, NewSubmission, OutboxJob, Role, Team,
    TeamMember, UpdateRow, UserRoleRecord,
};
use crate::store::{NewTeamMember, Store, UpdateQuery};
use crate::StandupError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxState {
    Pending,
    Processing,
    Delivered,
    DeadLettered,
}

/// An outbox job together with its bookkeeping, as seen by tests.
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job: OutboxJob,
    pub state: OutboxState,
    pub last_error: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    created_seq: u64,
}

#[derive(Default)]
struct Inner {
    admins: Vec<String>,
    teams: Vec<Team>,
    members: Vec<TeamMember>,
    user_roles: Vec<UserRoleRecord>,
    updates: Vec<DailyUpdate>,
    outbox: BTreeMap<Uuid, StoredJob>,
    seq: u64,
    fail_next_submission: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge every later assertion.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_admin(&self, email: &str) {
        let mut inner = self.lock();
        if !inner.admins.iter().any(|a| a == email) {
            inner.admins.push(email.to_owned());
        }
    }

    /// Insert a team directly, bypassing validation.
    pub fn seed_team(&self, name: &str, manager_email: &str) -> Team {
        let team = Team {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            manager_email: manager_email.to_owned(),
            created_at: Utc::now(),
        };
        self.lock().teams.push(team.clone());
        team
    }

    /// Insert an update with an explicit timestamp, bypassing the service.
    pub fn seed_update(&self, update: DailyUpdate) {
        self.lock().updates.push(update);
    }

    /// Make the next `insert_submission` fail after validation, before any
    /// row becomes visible.
    pub fn fail_next_submission(&self) {
        self.lock().fail_next_submission = true;
    }

    pub fn update_count(&self) -> usize {
        self.lock().updates.len()
    }

    pub fn outbox_jobs(&self) -> Vec<StoredJob> {
        self.lock().outbox.values().cloned().collect()
    }
}

fn team_name(inner: &Inner, team_id: Uuid) -> Option<String> {
    inner.teams.iter().find(|t| t.id == team_id).map(|t| t.name.clone())
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StandupError> {
        Ok(())
    }

    async fn is_admin(&self, email: &str) -> Result<bool, StandupError> {
        Ok(self.lock().admins.iter().any(|a| a == email))
    }

    async fn teams_managed_by(&self, email: &str) -> Result<Vec<Team>, StandupError> {
        let inner = self.lock();
        let mut teams: Vec<Team> = inner
            .teams
            .iter()
            .filter(|t| t.manager_email == email)
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    async fn ensure_user_role(
        &self,
        email: &str,
        default_role: Role,
    ) -> Result<UserRoleRecord, StandupError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.user_roles.iter().find(|r| r.user_email == email) {
            return Ok(existing.clone());
        }
        let record = UserRoleRecord {
            id: Uuid::new_v4(),
            user_email: email.to_owned(),
            role: default_role,
            created_at: Utc::now(),
        };
        inner.user_roles.push(record.clone());
        Ok(record)
    }

    async fn list_user_roles(&self) -> Result<Vec<UserRoleRecord>, StandupError> {
        let mut records = self.lock().user_roles.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<UserRoleRecord, StandupError> {
        let mut inner = self.lock();
        let record = inner
            .user_roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StandupError::NotFound("user".into()))?;
        record.role = role;
        let record = record.clone();

        if role == Role::Admin {
            if !inner.admins.contains(&record.user_email) {
                inner.admins.push(record.user_email.clone());
            }
        } else {
            inner.admins.retain(|a| a != &record.user_email);
        }
        Ok(record)
    }

    async fn create_team(&self, name: &str, manager_email: &str) -> Result<Team, StandupError> {
        if self.lock().teams.iter().any(|t| t.name == name) {
            return Err(StandupError::Conflict(format!("team '{name}' already exists")));
        }
        Ok(self.seed_team(name, manager_email))
    }

    async fn get_team(&self, id: Uuid) -> Result<Team, StandupError> {
        self.lock()
            .teams
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StandupError::NotFound("team".into()))
    }

    async fn list_teams(&self) -> Result<Vec<Team>, StandupError> {
        let mut teams = self.lock().teams.clone();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    async fn teams_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Team>, StandupError> {
        let mut teams: Vec<Team> = self
            .lock()
            .teams
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    async fn delete_team(&self, id: Uuid) -> Result<(), StandupError> {
        let mut inner = self.lock();
        let before = inner.teams.len();
        inner.teams.retain(|t| t.id != id);
        if inner.teams.len() == before {
            return Err(StandupError::NotFound("team".into()));
        }
        inner.members.retain(|m| m.team_id != id);
        Ok(())
    }

    async fn add_member(&self, new: NewTeamMember) -> Result<TeamMember, StandupError> {
        let mut inner = self.lock();
        if !inner.teams.iter().any(|t| t.id == new.team_id) {
            return Err(StandupError::NotFound("team".into()));
        }
        if inner
            .members
            .iter()
            .any(|m| m.team_id == new.team_id && m.employee_id == new.employee_id)
        {
            return Err(StandupError::Conflict(
                "team member already exists (unique_employee_team)".into(),
            ));
        }
        let member = TeamMember {
            id: Uuid::new_v4(),
            team_id: new.team_id,
            employee_email: new.employee_email,
            employee_id: new.employee_id,
            display_name: new.display_name,
            created_at: Utc::now(),
        };
        inner.members.push(member.clone());
        Ok(member)
    }

    async fn list_members(&self, team_id: Option<Uuid>) -> Result<Vec<TeamMember>, StandupError> {
        let mut members: Vec<TeamMember> = self
            .lock()
            .members
            .iter()
            .filter(|m| team_id.map_or(true, |id| m.team_id == id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(members)
    }

    async fn memberships_for(&self, email: &str) -> Result<Vec<Membership>, StandupError> {
        let inner = self.lock();
        Ok(inner
            .members
            .iter()
            .filter(|m| m.employee_email == email)
            .filter_map(|m| {
                inner.teams.iter().find(|t| t.id == m.team_id).map(|t| Membership {
                    member_id: m.id,
                    team_id: t.id,
                    team_name: t.name.clone(),
                    manager_email: t.manager_email.clone(),
                    employee_email: m.employee_email.clone(),
                    employee_id: m.employee_id.clone(),
                    display_name: m.display_name.clone(),
                })
            })
            .collect())
    }

    async fn remove_member(&self, id: Uuid) -> Result<(), StandupError> {
        let mut inner = self.lock();
        let before = inner.members.len();
        inner.members.retain(|m| m.id != id);
        if inner.members.len() == before {
            return Err(StandupError::NotFound("team member".into()));
        }
        Ok(())
    }

    async fn insert_submission(
        &self,
        submission: &NewSubmission,
        created_at: DateTime<Utc>,
        update_id: Uuid,
        outbox: Vec<NewOutboxJob>,
    ) -> Result<DailyUpdate, StandupError> {
        let mut inner = self.lock();

        if !inner.teams.iter().any(|t| t.id == submission.team_id) {
            return Err(StandupError::NotFound("team".into()));
        }
        if std::mem::take(&mut inner.fail_next_submission) {
            return Err(StandupError::InvalidData("simulated write failure".into()));
        }

        let update = DailyUpdate {
            id: update_id,
            employee_name: submission.employee_name.clone(),
            employee_id: submission.employee_id.clone(),
            employee_email: submission.employee_email.clone(),
            team_id: submission.team_id,
            tasks_completed: submission.tasks_completed.clone(),
            status: submission.status,
            additional_notes: submission.additional_notes.clone(),
            created_at,
            blockers: submission
                .blockers
                .iter()
                .map(|b| Blocker {
                    id: Uuid::new_v4(),
                    blocker_type: b.blocker_type,
                    description: b.description.clone(),
                    expected_resolution_date: b.expected_resolution_date,
                })
                .collect(),
        };
        inner.updates.push(update.clone());

        for job in outbox {
            if inner.outbox.values().any(|s| s.job.idempotency_key == job.idempotency_key) {
                continue;
            }
            inner.seq += 1;
            let id = Uuid::new_v4();
            let created_seq = inner.seq;
            inner.outbox.insert(
                id,
                StoredJob {
                    job: OutboxJob {
                        id,
                        update_id,
                        channel: job.channel,
                        idempotency_key: job.idempotency_key,
                        summary: job.summary,
                        attempts: 0,
                        max_attempts: job.max_attempts,
                    },
                    state: OutboxState::Pending,
                    last_error: None,
                    claimed_at: None,
                    created_seq,
                },
            );
        }

        Ok(update)
    }

    async fn list_update_rows(&self, query: &UpdateQuery) -> Result<Vec<UpdateRow>, StandupError> {
        let inner = self.lock();
        let mut updates: Vec<&DailyUpdate> = inner
            .updates
            .iter()
            .filter(|u| query.team_id.map_or(true, |id| u.team_id == id))
            .filter(|u| {
                query
                    .employee_email
                    .as_deref()
                    .map_or(true, |email| u.employee_email == email)
            })
            .filter(|u| query.created_from.map_or(true, |from| u.created_at >= from))
            .filter(|u| query.created_to.map_or(true, |to| u.created_at <= to))
            .collect();
        updates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(updates
            .into_iter()
            .flat_map(|u| u.rows(team_name(&inner, u.team_id).as_deref()))
            .collect())
    }

    async fn claim_outbox_job(&self, lease: Duration) -> Result<Option<OutboxJob>, StandupError> {
        let now = Utc::now();
        let expired = |claimed: Option<DateTime<Utc>>| {
            claimed.map_or(true, |at| now.signed_duration_since(at).to_std().map_or(false, |age| age >= lease))
        };
        let mut inner = self.lock();
        let next = inner
            .outbox
            .values_mut()
            .filter(|s| match s.state {
                OutboxState::Pending => true,
                OutboxState::Processing => expired(s.claimed_at),
                _ => false,
            })
            .min_by_key(|s| s.created_seq);

        Ok(next.map(|stored| {
            stored.state = OutboxState::Processing;
            stored.claimed_at = Some(now);
            stored.job.attempts += 1;
            stored.job.clone()
        }))
    }

    async fn complete_outbox_job(&self, id: Uuid) -> Result<(), StandupError> {
        let mut inner = self.lock();
        let stored = inner
            .outbox
            .get_mut(&id)
            .ok_or_else(|| StandupError::NotFound("outbox job".into()))?;
        stored.state = OutboxState::Delivered;
        stored.last_error = None;
        Ok(())
    }

    async fn fail_outbox_job(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
    ) -> Result<(), StandupError> {
        let mut inner = self.lock();
        let stored = inner
            .outbox
            .get_mut(&id)
            .ok_or_else(|| StandupError::NotFound("outbox job".into()))?;
        stored.state = if terminal || stored.job.attempts >= stored.job.max_attempts {
            OutboxState::DeadLettered
        } else {
            OutboxState::Pending
        };
        stored.last_error = Some(error.to_owned());
        Ok(())
    }
}
