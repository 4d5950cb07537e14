//! Postgres-backed [`Store`] built on the `db` crate's repository functions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use db::models as rows;
use db::repository::{admins, members, outbox, teams, updates, user_roles};
use db::{DbError, DbPool};

use crate::models::{
    Blocker, BlockerType, DailyUpdate, Membership, NewOutboxJob, NewSubmission, OutboxJob, Role,
    Status, Team, TeamMember, UpdateRow, UserRoleRecord,
};
use crate::store::{NewTeamMember, Store, UpdateQuery};
use crate::StandupError;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map repository errors, naming the entity for `NotFound`.
fn db_err(entity: &'static str) -> impl Fn(DbError) -> StandupError {
    move |err| match err {
        DbError::NotFound => StandupError::NotFound(entity.to_owned()),
        DbError::Conflict(constraint) => {
            StandupError::Conflict(format!("{entity} already exists ({constraint})"))
        }
        other => StandupError::Database(other),
    }
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, StandupError> {
    value.parse().map_err(StandupError::InvalidData)
}

fn team(row: rows::TeamRow) -> Team {
    Team {
        id: row.id,
        name: row.name,
        manager_email: row.manager_email,
        created_at: row.created_at,
    }
}

fn member(row: rows::TeamMemberRow) -> TeamMember {
    TeamMember {
        id: row.id,
        team_id: row.team_id,
        employee_email: row.employee_email,
        employee_id: row.employee_id,
        display_name: row.display_name,
        created_at: row.created_at,
    }
}

fn user_role(row: rows::UserRoleRow) -> Result<UserRoleRecord, StandupError> {
    Ok(UserRoleRecord {
        id: row.id,
        role: parse(&row.role)?,
        user_email: row.user_email,
        created_at: row.created_at,
    })
}

fn update_row(row: rows::UpdateViewRow) -> Result<UpdateRow, StandupError> {
    let blocker_type = row
        .blocker_type
        .as_deref()
        .map(parse::<BlockerType>)
        .transpose()?;

    Ok(UpdateRow {
        id: row.blocker_id.unwrap_or(row.update_id),
        update_id: row.update_id,
        status: parse::<Status>(&row.status)?,
        employee_name: row.employee_name,
        employee_id: row.employee_id,
        employee_email: row.employee_email,
        team_id: row.team_id,
        team_name: row.team_name,
        tasks_completed: row.tasks_completed,
        blocker_type,
        blocker_description: row.blocker_description,
        expected_resolution_date: row.expected_resolution_date,
        additional_notes: row.additional_notes,
        created_at: row.created_at,
    })
}

/// Claims stamped at or before this instant have expired.
fn lease_cutoff(lease: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_sub_signed(lease))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn outbox_job(row: rows::OutboxRow) -> Result<OutboxJob, StandupError> {
    Ok(OutboxJob {
        id: row.id,
        update_id: row.update_id,
        channel: parse(&row.channel)?,
        idempotency_key: row.idempotency_key,
        summary: serde_json::from_value(row.payload)?,
        attempts: row.attempts,
        max_attempts: row.max_attempts,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StandupError> {
        db::pool::ping(&self.pool).await?;
        Ok(())
    }

    async fn is_admin(&self, email: &str) -> Result<bool, StandupError> {
        Ok(admins::find_admin(&self.pool, email).await?.is_some())
    }

    async fn teams_managed_by(&self, email: &str) -> Result<Vec<Team>, StandupError> {
        let rows = teams::teams_managed_by(&self.pool, email).await?;
        Ok(rows.into_iter().map(team).collect())
    }

    async fn ensure_user_role(
        &self,
        email: &str,
        default_role: Role,
    ) -> Result<UserRoleRecord, StandupError> {
        let row = user_roles::ensure_user_role(&self.pool, email, default_role.as_str()).await?;
        user_role(row)
    }

    async fn list_user_roles(&self) -> Result<Vec<UserRoleRecord>, StandupError> {
        user_roles::list_user_roles(&self.pool)
            .await?
            .into_iter()
            .map(user_role)
            .collect()
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<UserRoleRecord, StandupError> {
        let row = user_roles::set_role(&self.pool, id, role.as_str())
            .await
            .map_err(db_err("user"))?;
        user_role(row)
    }

    async fn create_team(&self, name: &str, manager_email: &str) -> Result<Team, StandupError> {
        let row = teams::create_team(&self.pool, name, manager_email)
            .await
            .map_err(db_err("team"))?;
        Ok(team(row))
    }

    async fn get_team(&self, id: Uuid) -> Result<Team, StandupError> {
        let row = teams::get_team(&self.pool, id).await.map_err(db_err("team"))?;
        Ok(team(row))
    }

    async fn list_teams(&self) -> Result<Vec<Team>, StandupError> {
        Ok(teams::list_teams(&self.pool).await?.into_iter().map(team).collect())
    }

    async fn teams_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Team>, StandupError> {
        Ok(teams::teams_by_ids(&self.pool, ids).await?.into_iter().map(team).collect())
    }

    async fn delete_team(&self, id: Uuid) -> Result<(), StandupError> {
        teams::delete_team(&self.pool, id).await.map_err(db_err("team"))
    }

    async fn add_member(&self, new: NewTeamMember) -> Result<TeamMember, StandupError> {
        let row = members::add_member(
            &self.pool,
            new.team_id,
            &new.employee_email,
            &new.employee_id,
            &new.display_name,
        )
        .await
        .map_err(db_err("team member"))?;
        Ok(member(row))
    }

    async fn list_members(&self, team_id: Option<Uuid>) -> Result<Vec<TeamMember>, StandupError> {
        let rows = members::list_members(&self.pool, team_id).await?;
        Ok(rows.into_iter().map(member).collect())
    }

    async fn memberships_for(&self, email: &str) -> Result<Vec<Membership>, StandupError> {
        let rows = members::memberships_for(&self.pool, email).await?;
        Ok(rows
            .into_iter()
            .map(|row| Membership {
                member_id: row.member_id,
                team_id: row.team_id,
                team_name: row.team_name,
                manager_email: row.manager_email,
                employee_email: row.employee_email,
                employee_id: row.employee_id,
                display_name: row.display_name,
            })
            .collect())
    }

    async fn remove_member(&self, id: Uuid) -> Result<(), StandupError> {
        members::delete_member(&self.pool, id).await.map_err(db_err("team member"))
    }

    async fn insert_submission(
        &self,
        submission: &NewSubmission,
        created_at: DateTime<Utc>,
        update_id: Uuid,
        outbox_jobs: Vec<NewOutboxJob>,
    ) -> Result<DailyUpdate, StandupError> {
        let update = rows::NewDailyUpdate {
            id: update_id,
            employee_name: submission.employee_name.clone(),
            employee_id: submission.employee_id.clone(),
            employee_email: submission.employee_email.clone(),
            team_id: submission.team_id,
            tasks_completed: submission.tasks_completed.clone(),
            status: submission.status.to_string(),
            additional_notes: submission.additional_notes.clone(),
            created_at,
        };

        let blockers: Vec<Blocker> = submission
            .blockers
            .iter()
            .map(|b| Blocker {
                id: Uuid::new_v4(),
                blocker_type: b.blocker_type,
                description: b.description.clone(),
                expected_resolution_date: b.expected_resolution_date,
            })
            .collect();
        let blocker_rows: Vec<rows::NewBlocker> = blockers
            .iter()
            .map(|b| rows::NewBlocker {
                id: b.id,
                blocker_type: b.blocker_type.to_string(),
                description: b.description.clone(),
                expected_resolution_date: b.expected_resolution_date,
            })
            .collect();

        let entries = outbox_jobs
            .into_iter()
            .map(|job| {
                Ok(rows::NewOutboxEntry {
                    channel: job.channel.to_string(),
                    idempotency_key: job.idempotency_key,
                    payload: serde_json::to_value(&job.summary)?,
                    max_attempts: job.max_attempts,
                })
            })
            .collect::<Result<Vec<_>, StandupError>>()?;

        let row = updates::insert_update(&self.pool, &update, &blocker_rows, &entries)
            .await
            .map_err(db_err("daily update"))?;

        Ok(DailyUpdate {
            id: row.id,
            status: parse(&row.status)?,
            employee_name: row.employee_name,
            employee_id: row.employee_id,
            employee_email: row.employee_email,
            team_id: row.team_id,
            tasks_completed: row.tasks_completed,
            additional_notes: row.additional_notes,
            created_at: row.created_at,
            blockers,
        })
    }

    async fn list_update_rows(&self, query: &UpdateQuery) -> Result<Vec<UpdateRow>, StandupError> {
        let query = updates::UpdateQuery {
            team_id: query.team_id,
            employee_email: query.employee_email.clone(),
            created_from: query.created_from,
            created_to: query.created_to,
        };
        updates::list_update_rows(&self.pool, &query)
            .await?
            .into_iter()
            .map(update_row)
            .collect()
    }

    async fn claim_outbox_job(&self, lease: Duration) -> Result<Option<OutboxJob>, StandupError> {
        outbox::fetch_next_entry(&self.pool, lease_cutoff(lease))
            .await?
            .map(outbox_job)
            .transpose()
    }

    async fn complete_outbox_job(&self, id: Uuid) -> Result<(), StandupError> {
        outbox::mark_delivered(&self.pool, id).await?;
        Ok(())
    }

    async fn fail_outbox_job(
        &self,
        id: Uuid,
        error: &str,
        terminal: bool,
    ) -> Result<(), StandupError> {
        outbox::mark_failed(&self.pool, id, error, terminal).await?;
        Ok(())
    }
}
