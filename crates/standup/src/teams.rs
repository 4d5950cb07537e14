//! Team and membership management.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{Team, TeamMember};
use crate::store::{NewTeamMember, Store};
use crate::validation::{is_valid_email, is_valid_employee_id, is_valid_team_name, require, ValidationErrors};
use crate::StandupError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTeamRequest {
    pub name: String,
    pub manager_email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddMemberRequest {
    pub team_id: String,
    pub display_name: String,
    pub employee_id: String,
    pub employee_email: String,
}

impl CreateTeamRequest {
    pub fn validate(&self) -> Result<(String, String), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = require(&mut errors, "name", &self.name, "Team name is required");
        if let Some(name) = name {
            if !is_valid_team_name(name) {
                errors.add("name", "Team name may only contain letters, numbers, spaces and hyphens");
            }
        }
        let manager = require(&mut errors, "manager_email", &self.manager_email, "Manager email is required");
        if let Some(manager) = manager {
            if !is_valid_email(manager) {
                errors.add("manager_email", "Manager email is invalid");
            }
        }
        errors.into_result()?;
        Ok((self.name.trim().to_owned(), self.manager_email.trim().to_owned()))
    }
}

impl AddMemberRequest {
    pub fn validate(&self) -> Result<NewTeamMember, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let team_id = require(&mut errors, "team_id", &self.team_id, "Team selection is required")
            .and_then(|raw| raw.parse::<Uuid>().ok());
        if team_id.is_none() && errors.get("team_id").is_none() {
            errors.add("team_id", "Team selection is invalid");
        }

        let name = require(&mut errors, "display_name", &self.display_name, "Employee name is required");

        let employee_id = require(&mut errors, "employee_id", &self.employee_id, "Employee ID is required");
        if let Some(id) = employee_id {
            if !is_valid_employee_id(id) {
                errors.add("employee_id", "Employee ID may only contain letters, numbers and hyphens");
            }
        }

        let email = require(&mut errors, "employee_email", &self.employee_email, "Email address is required");
        if let Some(email) = email {
            if !is_valid_email(email) {
                errors.add("employee_email", "Email address is invalid");
            }
        }

        match (team_id, name, employee_id, email) {
            (Some(team_id), Some(name), Some(id), Some(email)) if errors.is_empty() => Ok(NewTeamMember {
                team_id,
                employee_email: email.to_owned(),
                employee_id: id.to_owned(),
                display_name: name.to_owned(),
            }),
            _ => Err(errors),
        }
    }
}

pub struct TeamService {
    store: Arc<dyn Store>,
}

impl TeamService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_team(&self, request: &CreateTeamRequest) -> Result<Team, StandupError> {
        let (name, manager) = request.validate()?;
        let team = self.store.create_team(&name, &manager).await.map_err(|err| match err {
            StandupError::Conflict(_) => StandupError::Conflict("A team with this name already exists".into()),
            other => other,
        })?;
        info!(team_id = %team.id, "team created");
        Ok(team)
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>, StandupError> {
        self.store.list_teams().await
    }

    #[instrument(skip(self))]
    pub async fn delete_team(&self, id: Uuid) -> Result<(), StandupError> {
        self.store.delete_team(id).await?;
        info!("team deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(employee_id = %request.employee_id))]
    pub async fn add_member(&self, request: &AddMemberRequest) -> Result<TeamMember, StandupError> {
        let member = request.validate()?;
        self.store.get_team(member.team_id).await?;
        let member = self.store.add_member(member).await.map_err(|err| match err {
            StandupError::Conflict(_) => {
                StandupError::Conflict("This employee ID is already assigned to this team".into())
            }
            other => other,
        })?;
        info!(member_id = %member.id, "team member added");
        Ok(member)
    }

    pub async fn list_members(&self, team_id: Option<Uuid>) -> Result<Vec<TeamMember>, StandupError> {
        self.store.list_members(team_id).await
    }

    pub async fn remove_member(&self, id: Uuid) -> Result<(), StandupError> {
        self.store.remove_member(id).await
    }

    /// Teams offered on the update form: the user's own when they belong to
    /// any, otherwise every team.
    pub async fn form_teams(&self, email: &str) -> Result<Vec<Team>, StandupError> {
        let memberships = self.store.memberships_for(email).await?;
        if memberships.is_empty() {
            return self.store.list_teams().await;
        }
        let ids: Vec<Uuid> = memberships.iter().map(|m| m.team_id).collect();
        self.store.teams_by_ids(&ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn member_request(team_id: Uuid, employee_id: &str) -> AddMemberRequest {
        AddMemberRequest {
            team_id: team_id.to_string(),
            display_name: "  Asha Rao ".into(),
            employee_id: employee_id.into(),
            employee_email: " asha@example.com".into(),
        }
    }

    #[tokio::test]
    async fn rejects_bad_team_names_and_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let teams = TeamService::new(store);

        let bad = CreateTeamRequest { name: "Infra/Ops".into(), manager_email: "lead@example.com".into() };
        assert!(matches!(teams.create_team(&bad).await, Err(StandupError::Validation(_))));

        let good = CreateTeamRequest { name: "Platform".into(), manager_email: "lead@example.com".into() };
        teams.create_team(&good).await.unwrap();
        assert!(matches!(teams.create_team(&good).await, Err(StandupError::Conflict(_))));
    }

    #[tokio::test]
    async fn members_are_trimmed_and_unique_per_team() {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");
        let teams = TeamService::new(store);

        let member = teams.add_member(&member_request(team.id, "E-101")).await.unwrap();
        assert_eq!(member.display_name, "Asha Rao");
        assert_eq!(member.employee_email, "asha@example.com");

        let err = teams.add_member(&member_request(team.id, "E-101")).await.unwrap_err();
        assert!(matches!(err, StandupError::Conflict(msg) if msg.contains("already assigned")));
    }

    #[tokio::test]
    async fn invalid_employee_id_is_a_field_error() {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");
        let teams = TeamService::new(store);

        match teams.add_member(&member_request(team.id, "E 101")).await {
            Err(StandupError::Validation(errors)) => assert!(errors.get("employee_id").is_some()),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn form_teams_prefer_memberships() {
        let store = Arc::new(MemoryStore::new());
        let platform = store.seed_team("Platform", "lead@example.com");
        store.seed_team("Design", "lead@example.com");
        let teams = TeamService::new(store);

        assert_eq!(teams.form_teams("asha@example.com").await.unwrap().len(), 2);

        teams.add_member(&member_request(platform.id, "E-1")).await.unwrap();
        let mine = teams.form_teams("asha@example.com").await.unwrap();
        assert_eq!(mine.iter().map(|t| t.id).collect::<Vec<_>>(), vec![platform.id]);
    }
}
