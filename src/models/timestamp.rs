use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

use crate::error::{InstallError, Result};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";
const SQL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry of the shared index: the moment every value at the same
/// position was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }

    /// Parse an ISO-8601 date or date-time, with either a space or `T`
    /// separator. Offsets are normalised to UTC.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();

        for format in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self(dt));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(dt));
            }
        }

        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self(dt.naive_utc()))
            .map_err(|_| InstallError::InvalidTimestamp(format!("'{}'", text)))
    }

    pub fn from_unix_seconds(seconds: i64) -> Result<Self> {
        DateTime::from_timestamp(seconds, 0)
            .map(|dt| Self(dt.naive_utc()))
            .ok_or_else(|| {
                InstallError::InvalidTimestamp(format!("epoch seconds {} out of range", seconds))
            })
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Text form stored in the `date` column
    pub fn to_sql_string(&self) -> String {
        self.0.format(SQL_FORMAT).to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(SQL_FORMAT))
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_sql_string()))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an ISO-8601 date string or Unix epoch seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Timestamp, E> {
        Timestamp::parse(v).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Timestamp, E> {
        let text = std::str::from_utf8(v).map_err(E::custom)?;
        Timestamp::parse(text).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Timestamp, E> {
        Timestamp::from_unix_seconds(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Timestamp, E> {
        let seconds = i64::try_from(v).map_err(E::custom)?;
        Timestamp::from_unix_seconds(seconds).map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        let expected = NaiveDate::from_ymd_opt(2008, 1, 1)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();

        assert_eq!(Timestamp::parse("2008-01-01 13:00:00").unwrap().datetime(), expected);
        assert_eq!(Timestamp::parse("2008-01-01T13:00:00").unwrap().datetime(), expected);
        assert_eq!(Timestamp::parse("2008-01-01T14:00:00+01:00").unwrap().datetime(), expected);
        assert_eq!(
            Timestamp::parse(" 2008-01-01 ").unwrap().to_sql_string(),
            "2008-01-01 00:00:00"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Timestamp::parse("01/01/2008").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn test_epoch_seconds() {
        let ts = Timestamp::from_unix_seconds(86_400).unwrap();
        assert_eq!(ts.to_string(), "1970-01-02 00:00:00");
    }

    #[test]
    fn test_deserialize_index_entries() {
        let dates: Vec<Timestamp> =
            serde_json::from_str(r#"["2021-02-17 10:00:00", 0, "2021-02-17"]"#).unwrap();

        assert_eq!(dates.len(), 3);
        assert_eq!(dates[1].to_string(), "1970-01-01 00:00:00");
        assert_eq!(dates[2].to_string(), "2021-02-17 00:00:00");
    }
}
