//! Timestamp utilities
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision so that lexical order in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for database storage
pub fn to_db(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp read from the database
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Parse an optional timestamp column
pub fn from_db_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(from_db).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert_eq!(to_db(a).len(), to_db(b).len());
        assert!(to_db(a) < to_db(b));
        assert_eq!(to_db(a), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn test_parse_stored_timestamp() {
        let stamp = now();
        let parsed = from_db(&to_db(stamp)).unwrap();
        assert_eq!(parsed.timestamp_micros(), stamp.timestamp_micros());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(from_db("yesterday").is_err());
        assert!(from_db_opt(None).unwrap().is_none());
    }
}
