use super::{ContentId, UnitId};
use crate::store::{Row, StoreError, columns};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// Spellings seen for the same concept across store schemas, canonical first.
const POSITION_KEYS: &[&str] = &[
    columns::POSITION_SECONDS,
    "positionSeconds",
    "position",
    "progress_seconds",
    "progress",
];
const DURATION_KEYS: &[&str] = &[columns::DURATION_SECONDS, "durationSeconds", "duration"];
const UNIT_KEYS: &[&str] = &[columns::UNIT_ID, "unitId", "episode_id", "episodeId"];
const CONTENT_KEYS: &[&str] = &[columns::CONTENT_ID, "contentId", "media_id"];
const UPDATED_KEYS: &[&str] = &[columns::UPDATED_AT, "updatedAt", "last_watched_at"];

/// One durable watch-progress row, in canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchProgressRecord {
    pub content_id: ContentId,
    pub unit_id: Option<UnitId>,
    pub position_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl WatchProgressRecord {
    /// Normalize a raw store row. Alternate field spellings stop here.
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        let content_id = first_present(row, CONTENT_KEYS)
            .and_then(as_identifier)
            .ok_or_else(|| StoreError::Decode("row has no content id".to_string()))?;

        let unit_id = first_present(row, UNIT_KEYS).and_then(as_identifier);

        let position_seconds = first_present(row, POSITION_KEYS)
            .and_then(as_seconds)
            .ok_or_else(|| {
                StoreError::Decode(format!("row for {} has no position", content_id))
            })?;

        let duration_seconds = first_present(row, DURATION_KEYS).and_then(as_seconds);

        let updated_at = first_present(row, UPDATED_KEYS)
            .and_then(as_timestamp)
            .unwrap_or_default();

        Ok(Self {
            content_id: ContentId::new(content_id),
            unit_id: unit_id.map(UnitId::new),
            position_seconds: position_seconds.max(0),
            duration_seconds: duration_seconds.map(|d| d.max(0)),
            updated_at,
        })
    }

    /// Whether the stored position is within `near_end_seconds` of the end.
    ///
    /// Always false when the duration is unknown.
    pub fn is_completed(&self, near_end_seconds: u64) -> bool {
        match self.duration_seconds {
            Some(duration) if duration > 0 => {
                duration - self.position_seconds <= near_end_seconds as i64
            }
            _ => false,
        }
    }

    pub fn position(&self) -> Duration {
        Duration::from_secs(self.position_seconds.max(0) as u64)
    }

    /// Progress as a fraction (0.0 to 1.0), when the duration is known.
    pub fn progress_fraction(&self) -> Option<f64> {
        match self.duration_seconds {
            Some(duration) if duration > 0 => {
                Some((self.position_seconds as f64 / duration as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }
}

fn first_present<'a>(row: &'a Row, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .find(|value| !value.is_null())
}

fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        // Epoch seconds or milliseconds
        Value::Number(n) => n.as_i64().and_then(|raw| {
            if raw > 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_canonical_row() {
        let record = WatchProgressRecord::from_row(&row(json!({
            "user_id": "u1",
            "content_id": "m1",
            "unit_id": null,
            "position_seconds": 700,
            "duration_seconds": 1200,
            "updated_at": "2025-01-02T03:04:05.678Z"
        })))
        .unwrap();

        assert_eq!(record.content_id.as_str(), "m1");
        assert_eq!(record.unit_id, None);
        assert_eq!(record.position_seconds, 700);
        assert_eq!(record.duration_seconds, Some(1200));
        assert_eq!(record.updated_at.timestamp_subsec_millis(), 678);
    }

    #[test]
    fn test_alternate_spellings() {
        let record = WatchProgressRecord::from_row(&row(json!({
            "contentId": "show",
            "episodeId": "e3",
            "position": 61.9,
            "duration": "1500",
            "updatedAt": "2025-01-02 03:04:05"
        })))
        .unwrap();

        assert_eq!(record.content_id.as_str(), "show");
        assert_eq!(record.unit_id, Some(UnitId::new("e3")));
        assert_eq!(record.position_seconds, 61);
        assert_eq!(record.duration_seconds, Some(1500));
        assert_eq!(record.updated_at.timestamp(), 1_735_787_045);
    }

    #[test]
    fn test_missing_duration_column() {
        let record = WatchProgressRecord::from_row(&row(json!({
            "content_id": "m1",
            "position_seconds": 10
        })))
        .unwrap();

        assert_eq!(record.duration_seconds, None);
        assert!(!record.is_completed(5));
        assert_eq!(record.progress_fraction(), None);
    }

    #[test]
    fn test_rejects_rows_without_position() {
        let result = WatchProgressRecord::from_row(&row(json!({ "content_id": "m1" })));
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_completion_threshold() {
        let mut record = WatchProgressRecord::from_row(&row(json!({
            "content_id": "m1",
            "position_seconds": 95,
            "duration_seconds": 100
        })))
        .unwrap();
        assert!(record.is_completed(5));

        record.position_seconds = 94;
        assert!(!record.is_completed(5));
    }
}
