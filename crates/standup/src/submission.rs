//! Daily update submission: request validation and the atomic write of the
//! update, its blockers and its notification outbox jobs.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use notify::Channel;

use crate::models::{BlockerType, DailyUpdate, NewBlocker, NewOutboxJob, NewSubmission, Status};
use crate::store::Store;
use crate::validation::{is_valid_email, parse_date, require, ValidationErrors};
use crate::StandupError;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Form payload as the client sends it. Everything is a string so that bad
/// input turns into field messages rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitRequest {
    pub employee_name: String,
    pub employee_id: String,
    pub email_address: String,
    pub team_id: String,
    pub tasks_completed: String,
    pub status: String,
    pub additional_notes: String,
    pub blockers: Vec<SubmitBlocker>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitBlocker {
    #[serde(rename = "type")]
    pub blocker_type: String,
    pub description: String,
    pub expected_resolution_date: String,
}

impl SubmitRequest {
    /// Tie the submission to the signed-in account. An empty email is filled
    /// in; a different one is refused.
    pub fn bind_submitter(&mut self, account_email: &str) -> Result<(), ValidationErrors> {
        let given = self.email_address.trim();
        if given.is_empty() {
            self.email_address = account_email.to_owned();
            return Ok(());
        }
        if !given.eq_ignore_ascii_case(account_email.trim()) {
            let mut errors = ValidationErrors::new();
            errors.add("email_address", "Email address must match the signed-in account");
            return Err(errors);
        }
        Ok(())
    }

    /// Check every field, collecting one message per failing field.
    pub fn validate(&self) -> Result<NewSubmission, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let employee_name = require(&mut errors, "employee_name", &self.employee_name, "Employee name is required");
        let employee_id = require(&mut errors, "employee_id", &self.employee_id, "Employee ID is required");

        let email = require(&mut errors, "email_address", &self.email_address, "Email address is required");
        if let Some(email) = email {
            if !is_valid_email(email) {
                errors.add("email_address", "Email address is invalid");
            }
        }

        let team_id = require(&mut errors, "team", &self.team_id, "Team selection is required")
            .and_then(|raw| match raw.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("team", "Team selection is invalid");
                    None
                }
            });

        let tasks = require(&mut errors, "tasks_completed", &self.tasks_completed, "Tasks completed is required");

        let status = match self.status.trim() {
            "" => Some(Status::InProgress),
            raw => match raw.parse::<Status>() {
                Ok(status) => Some(status),
                Err(_) => {
                    errors.add("status", "Status must be in-progress, completed or blocked");
                    None
                }
            },
        };

        let mut blockers = Vec::with_capacity(self.blockers.len());
        for (i, blocker) in self.blockers.iter().enumerate() {
            if let Some(blocker) = blocker.validate(i, &mut errors) {
                blockers.push(blocker);
            }
        }

        match (employee_name, employee_id, email, team_id, tasks, status) {
            (Some(name), Some(id), Some(email), Some(team_id), Some(tasks), Some(status))
                if errors.is_empty() =>
            {
                let notes = self.additional_notes.trim();
                Ok(NewSubmission {
                    employee_name: name.to_owned(),
                    employee_id: id.to_owned(),
                    employee_email: email.to_owned(),
                    team_id,
                    tasks_completed: tasks.to_owned(),
                    status,
                    additional_notes: (!notes.is_empty()).then(|| notes.to_owned()),
                    blockers,
                })
            }
            _ => Err(errors),
        }
    }
}

impl SubmitBlocker {
    fn validate(&self, index: usize, errors: &mut ValidationErrors) -> Option<NewBlocker> {
        let field = |name: &str| format!("blockers.{index}.{name}");

        let blocker_type = match self.blocker_type.trim().parse::<BlockerType>() {
            Ok(t) => Some(t),
            Err(_) => {
                errors.add(field("type"), "Type must be Blockers, Risks or Dependencies");
                None
            }
        };
        let description = require(errors, &field("description"), &self.description, "Description is required");
        let date = match self.expected_resolution_date.trim() {
            "" => {
                errors.add(field("expected_resolution_date"), "Expected resolution date is required");
                None
            }
            raw => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    errors.add(field("expected_resolution_date"), "Expected resolution date must be YYYY-MM-DD");
                }
                parsed
            }
        };

        Some(NewBlocker {
            blocker_type: blocker_type?,
            description: description?.to_owned(),
            expected_resolution_date: date?,
        })
    }
}

/// Writes submissions and queues one notification per enabled channel.
pub struct SubmissionService {
    store: Arc<dyn Store>,
    channels: Vec<Channel>,
    max_attempts: i32,
}

pub fn idempotency_key(update_id: Uuid, channel: Channel) -> String {
    format!("{update_id}:{channel}")
}

impl SubmissionService {
    pub fn new(store: Arc<dyn Store>, channels: Vec<Channel>, max_attempts: i32) -> Self {
        Self { store, channels, max_attempts }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Validate and store one update. Nothing is written unless the update,
    /// every blocker and every outbox job commit together.
    #[instrument(skip(self, request), fields(email = %request.email_address))]
    pub async fn submit(&self, request: &SubmitRequest) -> Result<DailyUpdate, StandupError> {
        let submission = request.validate()?;

        let team = match self.store.get_team(submission.team_id).await {
            Ok(team) => team,
            Err(StandupError::NotFound(_)) => {
                let mut errors = ValidationErrors::new();
                errors.add("team", "Selected team does not exist");
                return Err(errors.into());
            }
            Err(other) => return Err(other),
        };

        let update_id = Uuid::new_v4();
        let created_at = Utc::now();
        let summary = submission.summary(&team, update_id, created_at);
        let jobs = self
            .channels
            .iter()
            .map(|&channel| NewOutboxJob {
                channel,
                idempotency_key: idempotency_key(update_id, channel),
                summary: summary.clone(),
                max_attempts: self.max_attempts,
            })
            .collect();

        let update = self
            .store
            .insert_submission(&submission, created_at, update_id, jobs)
            .await?;

        info!(
            update_id = %update.id,
            team = %team.name,
            blockers = update.blockers.len(),
            "daily update stored"
        );
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UpdateQuery};

    fn request(team_id: Uuid) -> SubmitRequest {
        SubmitRequest {
            employee_name: "Asha Rao".into(),
            employee_id: "E-101".into(),
            email_address: "asha@example.com".into(),
            team_id: team_id.to_string(),
            tasks_completed: "Shipped the export".into(),
            status: "in-progress".into(),
            additional_notes: String::new(),
            blockers: Vec::new(),
        }
    }

    fn blocker(kind: &str, description: &str, date: &str) -> SubmitBlocker {
        SubmitBlocker {
            blocker_type: kind.into(),
            description: description.into(),
            expected_resolution_date: date.into(),
        }
    }

    fn service(store: &Arc<MemoryStore>) -> SubmissionService {
        SubmissionService::new(store.clone(), vec![Channel::Email, Channel::Sheet], DEFAULT_MAX_ATTEMPTS)
    }

    #[test]
    fn empty_form_reports_every_required_field() {
        let errors = SubmitRequest::default().validate().unwrap_err();
        assert_eq!(errors.get("employee_name"), Some("Employee name is required"));
        assert_eq!(errors.get("employee_id"), Some("Employee ID is required"));
        assert_eq!(errors.get("email_address"), Some("Email address is required"));
        assert_eq!(errors.get("team"), Some("Team selection is required"));
        assert_eq!(errors.get("tasks_completed"), Some("Tasks completed is required"));
    }

    #[test]
    fn malformed_email_and_blocker_fields_are_reported() {
        let mut req = request(Uuid::new_v4());
        req.email_address = "asha@example".into();
        req.blockers = vec![blocker("Risks", "", "01/02/2025")];

        let errors = req.validate().unwrap_err();
        assert_eq!(errors.get("email_address"), Some("Email address is invalid"));
        assert_eq!(errors.get("blockers.0.description"), Some("Description is required"));
        assert!(errors.get("blockers.0.expected_resolution_date").is_some());
    }

    #[tokio::test]
    async fn zero_blockers_store_one_row_without_blocker_fields() {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");

        let update = service(&store).submit(&request(team.id)).await.unwrap();
        let rows = store.list_update_rows(&UpdateQuery::default()).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].update_id, update.id);
        assert_eq!(rows[0].blocker_type, None);
        assert_eq!(rows[0].blocker_description, None);
        assert_eq!(rows[0].expected_resolution_date, None);
    }

    #[tokio::test]
    async fn each_blocker_becomes_a_row_with_shared_base_fields() {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");
        let mut req = request(team.id);
        req.blockers = vec![
            blocker("Risks", "D1", "2025-01-01"),
            blocker("Blockers", "D2", "2025-01-02"),
        ];

        service(&store).submit(&req).await.unwrap();
        let rows = store.list_update_rows(&UpdateQuery::default()).await.unwrap();

        assert_eq!(rows.len(), 2);
        let base = |r: &crate::models::UpdateRow| {
            (r.update_id, r.employee_email.clone(), r.tasks_completed.clone(), r.status, r.created_at)
        };
        assert_eq!(base(&rows[0]), base(&rows[1]));
        let descriptions: Vec<_> = rows.iter().filter_map(|r| r.blocker_description.clone()).collect();
        assert_eq!(descriptions, vec!["D1", "D2"]);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_rows_or_jobs() {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");
        store.fail_next_submission();

        let mut req = request(team.id);
        req.blockers = vec![blocker("Risks", "D1", "2025-01-01")];
        assert!(service(&store).submit(&req).await.is_err());

        assert_eq!(store.update_count(), 0);
        assert!(store.outbox_jobs().is_empty());
        assert!(store.list_update_rows(&UpdateQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queues_one_job_per_channel_keyed_by_update() {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");

        let update = service(&store).submit(&request(team.id)).await.unwrap();
        let mut keys: Vec<_> = store.outbox_jobs().into_iter().map(|j| j.job.idempotency_key).collect();
        keys.sort();

        assert_eq!(keys, vec![format!("{}:email", update.id), format!("{}:sheet", update.id)]);
    }

    #[tokio::test]
    async fn unknown_team_is_a_field_error() {
        let store = Arc::new(MemoryStore::new());
        let err = service(&store).submit(&request(Uuid::new_v4())).await.unwrap_err();

        match err {
            StandupError::Validation(errors) => assert!(errors.get("team").is_some()),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn submitter_email_is_bound_to_the_account() {
        let mut blank = SubmitRequest::default();
        blank.bind_submitter("asha@example.com").unwrap();
        assert_eq!(blank.email_address, "asha@example.com");

        let mut same = SubmitRequest { email_address: " Asha@Example.com ".into(), ..SubmitRequest::default() };
        assert!(same.bind_submitter("asha@example.com").is_ok());

        let mut other = SubmitRequest { email_address: "lead@example.com".into(), ..SubmitRequest::default() };
        let errors = other.bind_submitter("asha@example.com").unwrap_err();
        assert_eq!(errors.get("email_address"), Some("Email address must match the signed-in account"));
    }
}
