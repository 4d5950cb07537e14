//! The update form's local draft.
//!
//! Every edit is written through to [`Storage`] immediately, under three
//! keys: the form fields, the blocker list and the selected team. Loading
//! merges whatever draft exists over defaults taken from the signed-in user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{BlockerType, CachedUser, Status};
use crate::storage::{read_json, write_json, Storage, BLOCKERS_KEY, FORM_DATA_KEY, SELECTED_TEAM_KEY};
use crate::submission::{SubmitBlocker, SubmitRequest};
use crate::validation::{parse_date, ValidationErrors};
use crate::StandupError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftFields {
    pub employee_name: String,
    pub employee_id: String,
    pub email_address: String,
    pub tasks_completed: String,
    pub status: Status,
    pub additional_notes: String,
}

impl Default for DraftFields {
    fn default() -> Self {
        Self {
            employee_name: String::new(),
            employee_id: String::new(),
            email_address: String::new(),
            tasks_completed: String::new(),
            status: Status::InProgress,
            additional_notes: String::new(),
        }
    }
}

impl DraftFields {
    fn for_user(user: Option<&CachedUser>) -> Self {
        Self {
            employee_name: user.map(|u| u.name.clone()).unwrap_or_default(),
            email_address: user.map(|u| u.email.clone()).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Set a field by its form name.
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), StandupError> {
        let slot = match field {
            "employee_name"    => &mut self.employee_name,
            "employee_id"      => &mut self.employee_id,
            "email_address"    => &mut self.email_address,
            "tasks_completed"  => &mut self.tasks_completed,
            "additional_notes" => &mut self.additional_notes,
            "status" => {
                self.status = value.trim().parse().map_err(|_| {
                    let mut errors = ValidationErrors::new();
                    errors.add("status", "Status must be in-progress, completed or blocked");
                    StandupError::from(errors)
                })?;
                return Ok(());
            }
            other => {
                let mut errors = ValidationErrors::new();
                errors.add(other, "Unknown form field");
                return Err(errors.into());
            }
        };
        *slot = value.to_owned();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftBlocker {
    pub id: String,
    #[serde(rename = "type")]
    pub blocker_type: BlockerType,
    pub description: String,
    pub expected_resolution_date: String,
}

/// The form being edited, bound to the storage it persists into.
pub struct DraftEditor {
    storage: Arc<dyn Storage>,
    defaults: DraftFields,
    default_team: Option<String>,
    fields: DraftFields,
    blockers: Vec<DraftBlocker>,
    selected_team: Option<String>,
}

impl DraftEditor {
    /// Load the stored draft, if any, over the user's defaults.
    pub fn load(storage: Arc<dyn Storage>, user: Option<&CachedUser>) -> Result<Self, StandupError> {
        let defaults = DraftFields::for_user(user);
        let default_team = user.and_then(|u| u.team_id).map(|id| id.to_string());

        let fields = match read_json::<Value>(storage.as_ref(), FORM_DATA_KEY)? {
            Some(stored) => merge_fields(&defaults, stored),
            None => defaults.clone(),
        };
        let blockers = read_json::<Vec<DraftBlocker>>(storage.as_ref(), BLOCKERS_KEY)?.unwrap_or_default();
        let selected_team = storage
            .get(SELECTED_TEAM_KEY)?
            .filter(|t| !t.trim().is_empty())
            .or_else(|| default_team.clone());

        debug!(blockers = blockers.len(), "draft loaded");
        Ok(Self { storage, defaults, default_team, fields, blockers, selected_team })
    }

    pub fn fields(&self) -> &DraftFields {
        &self.fields
    }

    pub fn blockers(&self) -> &[DraftBlocker] {
        &self.blockers
    }

    pub fn selected_team(&self) -> Option<&str> {
        self.selected_team.as_deref()
    }

    /// Apply an edit to the form fields and persist it.
    pub fn edit(&mut self, change: impl FnOnce(&mut DraftFields)) -> Result<(), StandupError> {
        change(&mut self.fields);
        self.save_fields()
    }

    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), StandupError> {
        self.fields.set(field, value)?;
        self.save_fields()
    }

    pub fn select_team(&mut self, team_id: Uuid) -> Result<(), StandupError> {
        let team_id = team_id.to_string();
        self.storage.set(SELECTED_TEAM_KEY, &team_id)?;
        self.selected_team = Some(team_id);
        Ok(())
    }

    /// Append a blocker; description and expected resolution date are both
    /// required.
    pub fn add_blocker(
        &mut self,
        blocker_type: BlockerType,
        description: &str,
        expected_resolution_date: &str,
    ) -> Result<&DraftBlocker, StandupError> {
        let mut errors = ValidationErrors::new();
        if description.trim().is_empty() {
            errors.add("description", "Description is required");
        }
        if parse_date(expected_resolution_date).is_none() {
            errors.add("expected_resolution_date", "Expected resolution date is required (YYYY-MM-DD)");
        }
        errors.into_result()?;

        self.blockers.push(DraftBlocker {
            id: Uuid::new_v4().to_string(),
            blocker_type,
            description: description.trim().to_owned(),
            expected_resolution_date: expected_resolution_date.trim().to_owned(),
        });
        self.save_blockers()?;
        Ok(&self.blockers[self.blockers.len() - 1])
    }

    /// Returns whether a blocker with `id` existed.
    pub fn remove_blocker(&mut self, id: &str) -> Result<bool, StandupError> {
        let before = self.blockers.len();
        self.blockers.retain(|b| b.id != id);
        if self.blockers.len() == before {
            return Ok(false);
        }
        self.save_blockers()?;
        Ok(true)
    }

    /// True when leaving now would lose typed tasks or blockers.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.fields.tasks_completed.trim().is_empty() || !self.blockers.is_empty()
    }

    /// Drop the stored draft and return to the user's defaults.
    pub fn clear(&mut self) -> Result<(), StandupError> {
        for key in [FORM_DATA_KEY, BLOCKERS_KEY, SELECTED_TEAM_KEY] {
            self.storage.remove(key)?;
        }
        self.fields = self.defaults.clone();
        self.blockers.clear();
        self.selected_team = self.default_team.clone();
        Ok(())
    }

    /// Called once the server accepted the update.
    pub fn mark_submitted(&mut self) -> Result<(), StandupError> {
        self.clear()
    }

    pub fn to_request(&self) -> SubmitRequest {
        SubmitRequest {
            employee_name: self.fields.employee_name.clone(),
            employee_id: self.fields.employee_id.clone(),
            email_address: self.fields.email_address.clone(),
            team_id: self.selected_team.clone().unwrap_or_default(),
            tasks_completed: self.fields.tasks_completed.clone(),
            status: self.fields.status.to_string(),
            additional_notes: self.fields.additional_notes.clone(),
            blockers: self
                .blockers
                .iter()
                .map(|b| SubmitBlocker {
                    blocker_type: b.blocker_type.to_string(),
                    description: b.description.clone(),
                    expected_resolution_date: b.expected_resolution_date.clone(),
                })
                .collect(),
        }
    }

    fn save_fields(&self) -> Result<(), StandupError> {
        Ok(write_json(self.storage.as_ref(), FORM_DATA_KEY, &self.fields)?)
    }

    fn save_blockers(&self) -> Result<(), StandupError> {
        Ok(write_json(self.storage.as_ref(), BLOCKERS_KEY, &self.blockers)?)
    }
}

/// Overlay the stored keys onto the defaults; keys the draft lacks keep the
/// default value.
fn merge_fields(defaults: &DraftFields, stored: Value) -> DraftFields {
    let Value::Object(stored) = stored else {
        return defaults.clone();
    };
    let mut merged = match serde_json::to_value(defaults) {
        Ok(Value::Object(map)) => map,
        _ => return defaults.clone(),
    };
    merged.extend(stored);
    serde_json::from_value(Value::Object(merged)).unwrap_or_else(|err| {
        warn!(error = %err, "stored draft does not fit the form, using defaults");
        defaults.clone()
    })
}
