pub mod admin;
pub mod dashboard;
pub mod members;
pub mod meta;
pub mod teams;
pub mod updates;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::ApiError;

/// Parse an optional `YYYY-MM-DD` query value.
pub(crate) fn query_date(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => standup::validation::parse_date(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("{name} must be YYYY-MM-DD"))),
    }
}

/// Parse an optional id; an empty value means "no restriction".
pub(crate) fn query_uuid(name: &str, value: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("{name} is not a valid id"))),
    }
}
