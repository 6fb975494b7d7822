//! Schedule artifact
//!
//! The structured output of a planning cycle: an ordered list of study
//! events. Accepts the JSON the Planner emits:
//!
//! ```json
//! {"events": [{"summary": "Learn Math", "start": "2025-07-25T08:00:00",
//!              "end": "2025-07-25T09:30:00", "timeZone": "Asia/Ho_Chi_Minh",
//!              "description": "Review integrals"}]}
//! ```
//!
//! `title`/`summary` and `timezone`/`timeZone` are interchangeable. Timestamps
//! are local wall-clock times; an offset suffix is accepted and dropped.
//! Validation is all-or-nothing: one bad event rejects the whole artifact.

use chrono::{DateTime, NaiveDateTime};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reasons an artifact is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule is not a valid event list: {0}")]
    Malformed(String),

    #[error("schedule contains no events")]
    Empty,

    #[error("event {index} has no title")]
    MissingTitle { index: usize },

    #[error("event {index} has an invalid {field} timestamp '{value}'")]
    InvalidTimestamp {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("event {index} ('{title}') must end after it starts")]
    EndNotAfterStart { index: usize, title: String },
}

impl From<ScheduleError> for EngineError {
    fn from(err: ScheduleError) -> Self {
        EngineError::ArtifactValidation(err.to_string())
    }
}

/// One study session on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub title: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timezone: String,
}

/// A validated, non-empty list of events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleArtifact {
    pub events: Vec<Event>,
}

/// Wire shape before defaults and validation
#[derive(Debug, Deserialize)]
struct RawSchedule {
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(alias = "summary", default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    start: String,
    end: String,
    #[serde(alias = "timeZone", default)]
    timezone: Option<String>,
}

impl ScheduleArtifact {
    /// Build and validate an artifact from tool-call arguments.
    ///
    /// `arguments` may be the schedule object itself, the schedule wrapped as
    /// `{"json_data": {...}}`, or either of those encoded as a JSON string.
    pub fn from_arguments(
        arguments: &Value,
        default_timezone: &str,
    ) -> Result<Self, ScheduleError> {
        let value = unwrap_arguments(arguments)?;
        let raw: RawSchedule =
            serde_json::from_value(value).map_err(|e| ScheduleError::Malformed(e.to_string()))?;

        let mut events = Vec::with_capacity(raw.events.len());
        for (index, item) in raw.events.into_iter().enumerate() {
            let title = item
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .ok_or(ScheduleError::MissingTitle { index })?;

            events.push(Event {
                title,
                description: item.description.unwrap_or_default(),
                start: parse_timestamp(&item.start).ok_or_else(|| {
                    ScheduleError::InvalidTimestamp {
                        index,
                        field: "start",
                        value: item.start.clone(),
                    }
                })?,
                end: parse_timestamp(&item.end).ok_or_else(|| ScheduleError::InvalidTimestamp {
                    index,
                    field: "end",
                    value: item.end.clone(),
                })?,
                timezone: item
                    .timezone
                    .filter(|tz| !tz.trim().is_empty())
                    .unwrap_or_else(|| default_timezone.to_string()),
            });
        }

        let artifact = Self { events };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check the artifact invariants: at least one event, `start < end` for each.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.events.is_empty() {
            return Err(ScheduleError::Empty);
        }
        for (index, event) in self.events.iter().enumerate() {
            if event.start >= event.end {
                return Err(ScheduleError::EndNotAfterStart {
                    index,
                    title: event.title.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn unwrap_arguments(arguments: &Value) -> Result<Value, ScheduleError> {
    let value = match arguments {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map_err(|e| ScheduleError::Malformed(e.to_string()))?,
        other => other.clone(),
    };

    match value.get("json_data") {
        Some(Value::String(inner)) => {
            serde_json::from_str(inner).map_err(|e| ScheduleError::Malformed(e.to_string()))
        }
        Some(inner) => Ok(inner.clone()),
        None => Ok(value),
    }
}

/// Local wall-clock time from an ISO-8601 string, dropping any offset
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }
    if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        return Some(naive);
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TZ: &str = "Asia/Ho_Chi_Minh";

    #[test]
    fn test_accepts_calendar_field_names() {
        let args = json!({"events": [{
            "summary": "Learn Math",
            "start": "2025-07-25T08:00:00",
            "end": "2025-07-25T09:30:00",
            "timeZone": "Europe/Berlin",
            "description": "Review integrals"
        }]});

        let artifact = ScheduleArtifact::from_arguments(&args, TZ).unwrap();
        let event = &artifact.events[0];
        assert_eq!(event.title, "Learn Math");
        assert_eq!(event.timezone, "Europe/Berlin");
        assert_eq!(event.description, "Review integrals");
        assert_eq!(event.start.to_string(), "2025-07-25 08:00:00");
    }

    #[test]
    fn test_defaults_and_offset_dropped() {
        let args = json!({"events": [{
            "title": "Physics",
            "start": "2025-07-25T08:00:00+07:00",
            "end": "2025-07-25T09:00"
        }]});

        let artifact = ScheduleArtifact::from_arguments(&args, TZ).unwrap();
        let event = &artifact.events[0];
        assert_eq!(event.timezone, TZ);
        assert_eq!(event.description, "");
        assert_eq!(event.start.to_string(), "2025-07-25 08:00:00");
        assert_eq!(event.end.to_string(), "2025-07-25 09:00:00");
    }

    #[test]
    fn test_string_encoded_and_wrapped_arguments() {
        let inner = r#"{"events":[{"title":"Chem","start":"2025-07-26T10:00:00","end":"2025-07-26T11:00:00"}]}"#;
        let as_string = Value::String(inner.to_string());
        let wrapped = json!({ "json_data": inner });

        assert_eq!(ScheduleArtifact::from_arguments(&as_string, TZ).unwrap().len(), 1);
        assert_eq!(ScheduleArtifact::from_arguments(&wrapped, TZ).unwrap().len(), 1);
    }

    #[test]
    fn test_one_bad_event_rejects_whole_artifact() {
        let args = json!({"events": [
            {"title": "Good", "start": "2025-07-25T08:00:00", "end": "2025-07-25T09:00:00"},
            {"title": "Backwards", "start": "2025-07-25T10:00:00", "end": "2025-07-25T10:00:00"}
        ]});

        let err = ScheduleArtifact::from_arguments(&args, TZ).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::EndNotAfterStart {
                index: 1,
                title: "Backwards".to_string()
            }
        );
    }

    #[test]
    fn test_empty_and_malformed() {
        assert_eq!(
            ScheduleArtifact::from_arguments(&json!({"events": []}), TZ).unwrap_err(),
            ScheduleError::Empty
        );
        assert!(matches!(
            ScheduleArtifact::from_arguments(&json!({"plan": []}), TZ).unwrap_err(),
            ScheduleError::Malformed(_)
        ));
        assert!(matches!(
            ScheduleArtifact::from_arguments(
                &json!({"events": [{"title": "X", "start": "tomorrow", "end": "2025-07-25T09:00:00"}]}),
                TZ
            )
            .unwrap_err(),
            ScheduleError::InvalidTimestamp { field: "start", .. }
        ));
        assert_eq!(
            ScheduleArtifact::from_arguments(
                &json!({"events": [{"start": "2025-07-25T08:00:00", "end": "2025-07-25T09:00:00"}]}),
                TZ
            )
            .unwrap_err(),
            ScheduleError::MissingTitle { index: 0 }
        );
    }

    #[test]
    fn test_to_json_uses_iso_timestamps() {
        let args = json!({"events": [{"title": "A", "start": "2025-07-25T08:00:00", "end": "2025-07-25T09:00:00"}]});
        let artifact = ScheduleArtifact::from_arguments(&args, TZ).unwrap();
        let json = artifact.to_json();
        assert_eq!(json["events"][0]["start"], "2025-07-25T08:00:00");
        assert_eq!(json["events"][0]["timezone"], TZ);
    }
}
