//! Database access for mixcritic-jobs
//!
//! Each module owns the SQL for one table. Status and progress columns are
//! written only by `workflow::transitions`; the functions here read rows and
//! insert new ones.

pub mod analyses;
pub mod jobs;
pub mod projects;
pub mod reviews;
pub mod tracks;

use mixcritic_common::{Error, Result};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {} '{}': {}", column, value, e)))
}

pub(crate) fn parse_uuid_opt(column: &str, value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(|v| parse_uuid(column, v)).transpose()
}

pub(crate) fn parse_enum<T>(column: &str, value: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid {} column: {}", column, e)))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackStatus;

    #[test]
    fn test_parse_helpers_report_column() {
        let err = parse_uuid("track_id", "nope").unwrap_err();
        assert!(err.to_string().contains("track_id"));

        let status: TrackStatus = parse_enum("status", "analyzed").unwrap();
        assert_eq!(status, TrackStatus::Analyzed);
        assert!(parse_enum::<TrackStatus>("status", "bogus").is_err());
        assert!(parse_uuid_opt("parent_track_id", None).unwrap().is_none());
    }
}
