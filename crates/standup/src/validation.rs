//! Field-level validation shared by the submission form and team management.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Field name → human-readable message, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message; the first message for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// `Ok(())` when no message was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("static regex"))
}

fn team_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\s-]+$").expect("static regex"))
}

fn employee_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("static regex"))
}

pub fn is_valid_email(value: &str) -> bool {
    email_re().is_match(value)
}

/// Letters, numbers, spaces and hyphens.
pub fn is_valid_team_name(value: &str) -> bool {
    team_name_re().is_match(value)
}

/// Letters, numbers and hyphens.
pub fn is_valid_employee_id(value: &str) -> bool {
    employee_id_re().is_match(value)
}

/// Require a non-blank value, recording `message` under `field` otherwise.
pub fn require<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: &'a str,
    message: &str,
) -> Option<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, message);
        None
    } else {
        Some(trimmed)
    }
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
