use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

/// Opaque row id. The store may hand it out as a number or a string; it is
/// kept as text and only ever echoed back in filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "record id must be a string or number, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordStatus {
    #[default]
    Ready,
    Other(String),
}

impl RecordStatus {
    pub const READY: &'static str = "ready";

    pub fn as_str(&self) -> &str {
        match self {
            RecordStatus::Ready => Self::READY,
            RecordStatus::Other(s) => s,
        }
    }
}

impl<'de> Deserialize<'de> for RecordStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == Self::READY {
            RecordStatus::Ready
        } else {
            RecordStatus::Other(raw)
        })
    }
}

/// One row of the recipes table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_posted_at: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn is_ready(&self) -> bool {
        self.status == RecordStatus::Ready
    }

    pub fn display_title(&self) -> &str {
        self.title.trim()
    }
}

/// Aggregate counts reported by `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub total: u64,
    pub ready: u64,
    pub posted: u64,
    /// Ready recipes that have never been posted.
    pub remaining_ready: u64,
}

/// Telegram message id of a published post.
pub type PublishedId = i64;

/// Result of one publish cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No recipe with status `ready`.
    Idle,
    Published {
        record_id: RecordId,
        title: String,
        message_id: PublishedId,
    },
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    parse_timestamp(&raw)
        .map(|ts| Some(ts.date_naive()))
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised date: {raw}")))
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    parse_timestamp(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp: {raw}")))
}

/// Accepts `timestamptz` (RFC 3339) and plain `timestamp` (read as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn deserializes_full_row() {
        let row = json!({
            "id": 17,
            "title": " Pancakes ",
            "body": "Mix and fry.",
            "status": "ready",
            "image_path": "breakfast/pancakes.jpg",
            "image_url": null,
            "last_posted_at": "2024-03-01",
            "created_at": "2024-01-05T10:20:30.123456+00:00"
        });
        let rec: Record = serde_json::from_value(row).unwrap();
        assert_eq!(rec.id.as_str(), "17");
        assert_eq!(rec.display_title(), "Pancakes");
        assert!(rec.is_ready());
        assert_eq!(rec.image_path.as_deref(), Some("breakfast/pancakes.jpg"));
        assert!(rec.image_url.is_none());
        assert_eq!(
            rec.last_posted_at,
            Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            rec.created_at.map(|ts| ts.date_naive()),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn tolerates_sparse_row() {
        let rec: Record = serde_json::from_value(json!({
            "id": "b6f1c0de-0000-4000-8000-000000000001",
            "title": null
        }))
        .unwrap();
        assert_eq!(rec.id.as_str(), "b6f1c0de-0000-4000-8000-000000000001");
        assert_eq!(rec.title, "");
        assert_eq!(rec.body, "");
        assert!(rec.last_posted_at.is_none());
        assert!(rec.created_at.is_none());
    }

    #[test]
    fn non_ready_status_is_kept() {
        let rec: Record =
            serde_json::from_value(json!({ "id": 1, "status": "draft" })).unwrap();
        assert!(!rec.is_ready());
        assert_eq!(rec.status.as_str(), "draft");
    }

    #[test]
    fn timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(parse_timestamp("2024-02-03T04:05:06Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-02-03T04:05:06"), Some(expected));
        assert_eq!(parse_timestamp("2024-02-03 04:05:06"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);

        let rec: Record = serde_json::from_value(json!({
            "id": 1,
            "last_posted_at": "2024-02-03T23:00:00+00:00"
        }))
        .unwrap();
        assert_eq!(rec.last_posted_at, NaiveDate::from_ymd_opt(2024, 2, 3));
    }

    #[test]
    fn rejects_object_id() {
        let res: Result<Record, _> = serde_json::from_value(json!({ "id": {"x": 1} }));
        assert!(res.is_err());
    }
}
