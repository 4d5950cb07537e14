//! The submission summary carried in every outbox payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockerLine {
    pub blocker_type: String,
    pub description: String,
    /// ISO `YYYY-MM-DD`.
    pub expected_resolution_date: String,
}

/// Everything a channel needs to announce one daily update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub update_id: Uuid,
    pub employee_name: String,
    pub employee_email: String,
    pub employee_id: String,
    pub team_name: String,
    /// Recipient of the email channel; `None` when the team has no manager.
    pub manager_email: Option<String>,
    pub tasks_completed: String,
    pub status: String,
    pub blockers: Vec<BlockerLine>,
    pub additional_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionSummary {
    /// Human-readable date, e.g. `Tuesday, January 7, 2025`.
    pub fn display_date(&self) -> String {
        self.submitted_at.format("%A, %B %-d, %Y").to_string()
    }

    /// Blockers rendered one block per entry, or `None`.
    pub fn blockers_text(&self) -> String {
        if self.blockers.is_empty() {
            return "None".to_owned();
        }
        self.blockers
            .iter()
            .map(|b| {
                format!(
                    "Type: {}\nDescription: {}\nResolution Date: {}",
                    b.blocker_type, b.description, b.expected_resolution_date
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn notes_text(&self) -> &str {
        match self.additional_notes.as_deref() {
            Some(notes) if !notes.trim().is_empty() => notes,
            _ => "None",
        }
    }

    /// Plain-text body used by the email template's `message` parameter.
    pub fn message(&self) -> String {
        let recipient = self.manager_email.as_deref().unwrap_or("Manager");
        format!(
            "Dear {recipient},\n\n\
             A new daily update has been submitted:\n\n\
             Employee: {name}\n\
             Date: {date}\n\
             Team: {team}\n\n\
             Tasks Completed:\n{tasks}\n\n\
             Status: {status}\n\n\
             Blockers:\n{blockers}\n\n\
             Additional Notes:\n{notes}\n\n\
             Best regards,\n\
             Daily Updates System\n",
            name = self.employee_name,
            date = self.display_date(),
            team = self.team_name,
            tasks = self.tasks_completed,
            status = self.status,
            blockers = self.blockers_text(),
            notes = self.notes_text(),
        )
    }
}

#[cfg(test)]
pub(crate) fn sample_summary() -> SubmissionSummary {
    use chrono::TimeZone;

    SubmissionSummary {
        update_id: Uuid::nil(),
        employee_name: "Asha Rao".into(),
        employee_email: "asha@example.com".into(),
        employee_id: "E-101".into(),
        team_name: "Platform".into(),
        manager_email: Some("lead@example.com".into()),
        tasks_completed: "Shipped the importer".into(),
        status: "in-progress".into(),
        blockers: vec![BlockerLine {
            blocker_type: "Risks".into(),
            description: "Vendor API quota".into(),
            expected_resolution_date: "2025-01-10".into(),
        }],
        additional_notes: None,
        submitted_at: Utc.with_ymd_and_hms(2025, 1, 7, 9, 30, 0).unwrap(),
    }
}
