//! Timestamp normalization.
//!
//! Every public entry point that accepts a timestamp funnels it through
//! [`normalize`], so the window only ever sees `DateTime<FixedOffset>`.

use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::ValidationError;

/// ISO-8601 forms carrying an offset (`Z`, `+hh`, `+hhmm` or `+hh:mm`).
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

/// Offset-less ISO-8601 forms accepted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

/// Date-only forms, taken as midnight UTC.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// The timestamp representations accepted by the limiter.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampInput {
    /// An already typed instant.
    DateTime(DateTime<FixedOffset>),
    /// A wall-clock reading from the standard library.
    System(SystemTime),
    /// An ISO-8601 string.
    Iso(String),
}

impl<Tz: TimeZone> From<DateTime<Tz>> for TimestampInput {
    fn from(dt: DateTime<Tz>) -> Self {
        let offset = dt.offset().fix();
        TimestampInput::DateTime(dt.with_timezone(&offset))
    }
}

impl From<SystemTime> for TimestampInput {
    fn from(time: SystemTime) -> Self {
        TimestampInput::System(time)
    }
}

impl From<&str> for TimestampInput {
    fn from(s: &str) -> Self {
        TimestampInput::Iso(s.to_string())
    }
}

impl From<String> for TimestampInput {
    fn from(s: String) -> Self {
        TimestampInput::Iso(s)
    }
}

/// Normalize any accepted representation into a single instant.
pub fn normalize(input: impl Into<TimestampInput>) -> Result<DateTime<FixedOffset>, ValidationError> {
    match input.into() {
        TimestampInput::DateTime(dt) => Ok(dt),
        TimestampInput::System(time) => Ok(DateTime::<Utc>::from(time).into()),
        TimestampInput::Iso(s) => parse_iso(&s).ok_or(ValidationError::InvalidTimestamp(s)),
    }
}

/// Parse an ISO-8601 string, returning `None` if it does not describe an instant.
pub fn parse_iso(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt);
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_normalize_iso_with_offset() {
        let dt = normalize("2025-01-01T02:00:00+02:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 7200);
        assert_eq!(dt.with_timezone(&Utc).to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_normalize_iso_without_offset_is_utc() {
        let dt = normalize("2025-01-01T00:01:00").unwrap();
        assert_eq!(dt, normalize("2025-01-01T00:01:00Z").unwrap());
    }

    #[test]
    fn test_normalize_typed_instants() {
        let utc = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(normalize(utc).unwrap(), utc);

        let system = UNIX_EPOCH + Duration::from_secs(1_735_689_600);
        assert_eq!(normalize(system).unwrap(), utc);
    }

    #[test]
    fn test_iso_forms() {
        let accepted = [
            ("2025-01-01T01:00:00+01:00", "2025-01-01T00:00:00Z"),
            ("2025-01-01T01:00:00.5+01:00", "2025-01-01T00:00:00.5Z"),
            ("2025-01-01T01:00:00+0100", "2025-01-01T00:00:00Z"),
            ("2025-01-01T01:00:00+01", "2025-01-01T00:00:00Z"),
            ("2025-01-01T00:00Z", "2025-01-01T00:00:00Z"),
            ("2025-01-01T01:00+01:00", "2025-01-01T00:00:00Z"),
            ("20250101T000000Z", "2025-01-01T00:00:00Z"),
            ("20250101T010000+0100", "2025-01-01T00:00:00Z"),
            ("20250101T0000Z", "2025-01-01T00:00:00Z"),
            ("2025-01-01T00:00:00", "2025-01-01T00:00:00Z"),
            ("2025-01-01T00:00", "2025-01-01T00:00:00Z"),
            ("20250101T000000", "2025-01-01T00:00:00Z"),
            ("2025-01-01", "2025-01-01T00:00:00Z"),
            ("20250101", "2025-01-01T00:00:00Z"),
        ];
        for (input, expected) in accepted {
            let parsed = parse_iso(input).unwrap_or_else(|| panic!("{input} should parse"));
            assert_eq!(parsed, DateTime::parse_from_rfc3339(expected).unwrap(), "{input}");
        }

        let rejected = [
            "",
            "abc",
            "2025-01-02 00:00:00",
            "2025-13-01",
            "2025-01-01T25:00:00Z",
            "2025-01-01T00:00:00+",
            "01/01/2025",
        ];
        for input in rejected {
            assert!(parse_iso(input).is_none(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_normalize_keeps_compact_offset() {
        let dt = normalize("2025-01-01T00:00:00+0530").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(
            normalize("abc"),
            Err(ValidationError::InvalidTimestamp("abc".to_string()))
        );
        // No offset and a space separator is not an accepted form.
        assert!(normalize("2025-01-02 00:00:00").is_err());
        assert!(normalize(String::new()).is_err());
    }
}
