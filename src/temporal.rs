//! Calendar dates and their representation at each store boundary.
//!
//! Source data carries plain `day/month/year` dates. Internally every date is a
//! [`CalendarDate`] and the only offset convention is UTC+00:00: the relational
//! store receives the naive calendar date, the document store receives the
//! instant at midnight UTC of that same day. Query windows are built from the
//! same type, so a date range means the same days in both models.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::fmt;

/// Literal date layout used by the source files.
pub const SOURCE_DATE_FORMAT: &str = "%d/%m/%Y";

/// Layout stored in the relational `release_date` column.
pub const RELATIONAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Layout stored in documents. Fixed width, so lexical order is chronological order.
pub const DOCUMENT_INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(CalendarDate)
    }

    /// Parse a source field. Anything that is not a valid `day/month/year` date yields `None`.
    pub fn parse_source(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        NaiveDate::parse_from_str(raw, SOURCE_DATE_FORMAT)
            .ok()
            .map(CalendarDate)
    }

    pub fn to_source_string(&self) -> String {
        self.0.format(SOURCE_DATE_FORMAT).to_string()
    }

    pub fn to_relational_text(&self) -> String {
        self.0.format(RELATIONAL_DATE_FORMAT).to_string()
    }

    pub fn to_document_instant(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_time(NaiveTime::MIN))
    }

    pub fn to_document_text(&self) -> String {
        format_instant(&self.to_document_instant())
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_relational_text())
    }
}

pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.format(DOCUMENT_INSTANT_FORMAT).to_string()
}

pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(text, DOCUMENT_INSTANT_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Serde adapter writing `Option<DateTime<Utc>>` in [`DOCUMENT_INSTANT_FORMAT`].
pub mod document_instant {
    use super::{format_instant, parse_instant};
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(instant) => serializer.serialize_str(&format_instant(instant)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => parse_instant(&text)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid instant '{}'", text))),
            None => Ok(None),
        }
    }
}
