//! CSV export of dashboard rows.

use chrono::NaiveDate;

use crate::models::UpdateRow;

pub const HEADERS: [&str; 8] = [
    "Date",
    "Team",
    "Employee",
    "Tasks Completed",
    "Status",
    "Blockers/Risks/Dependencies",
    "Expected Resolution",
    "Additional Notes",
];

/// Quote a field when it contains a comma, a quote or a line break.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

fn record(fields: impl IntoIterator<Item = String>) -> String {
    fields.into_iter().map(|f| escape_field(&f)).collect::<Vec<_>>().join(",")
}

pub fn export(rows: &[UpdateRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(HEADERS.join(","));
    lines.extend(rows.iter().map(|row| {
        record([
            row.created_at.date_naive().to_string(),
            row.team_name.clone().unwrap_or_default(),
            row.employee_email.clone(),
            row.tasks_completed.clone(),
            row.status.to_string(),
            row.blocker_type.map(|t| t.to_string()).unwrap_or_default(),
            row.expected_resolution_date.map(|d| d.to_string()).unwrap_or_default(),
            row.additional_notes.clone().unwrap_or_default(),
        ])
    }));
    lines.join("\n")
}

/// `daily-updates-YYYY-MM-DD.csv`
pub fn export_filename(date: NaiveDate) -> String {
    format!("daily-updates-{}.csv", date.format("%Y-%m-%d"))
}
