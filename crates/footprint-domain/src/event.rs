use chrono::{DateTime, NaiveDateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, ValidationError};

/// Maximum accepted length for an event type string.
pub const EVENT_TYPE_MAX_LEN: usize = 50;

/// Untrusted ingestion payload as received over the wire.
///
/// Field checks run in declaration order and the first failure wins,
/// so a request with several bad fields reports the earliest one.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TrackEventRequest {
    #[garde(range(min = 1))]
    pub user_id: i64,
    #[garde(length(min = 1, max = 50))]
    pub event_type: String,
    #[garde(custom(is_iso8601))]
    pub timestamp: String,
    #[garde(inner(custom(is_json_object)))]
    pub metadata: Option<Value>,
    /// Optional stable key for duplicate suppression in storage.
    #[garde(length(min = 1))]
    pub dedup_key: Option<String>,
}

fn is_iso8601(value: &str, _cx: &()) -> garde::Result {
    parse_timestamp(value)
        .map(|_| ())
        .ok_or_else(|| garde::Error::new("not a valid ISO-8601 timestamp"))
}

fn is_json_object(value: &Value, _cx: &()) -> garde::Result {
    if value.is_object() {
        Ok(())
    } else {
        Err(garde::Error::new("must be a JSON object"))
    }
}

/// Parses an ISO-8601 timestamp, either offset-aware or naive (assumed UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Validated, canonical event record as it travels over the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: i64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl ActivityEvent {
    /// Re-checks the canonical invariants after a queue round trip.
    ///
    /// The producer validates before enqueue, but delivery is at-least-once
    /// from an external broker, so the consumer never trusts the payload.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.user_id <= 0 {
            return Err(ValidationError {
                field: "user_id".to_string(),
                message: format!("must be positive, got {}", self.user_id),
            });
        }
        if self.event_type.is_empty() || self.event_type.chars().count() > EVENT_TYPE_MAX_LEN {
            return Err(ValidationError {
                field: "event_type".to_string(),
                message: format!(
                    "must be 1..={} characters, got {}",
                    EVENT_TYPE_MAX_LEN,
                    self.event_type.chars().count()
                ),
            });
        }
        Ok(())
    }
}

impl TryFrom<TrackEventRequest> for ActivityEvent {
    type Error = DomainError;

    fn try_from(request: TrackEventRequest) -> Result<Self, Self::Error> {
        let occurred_at = parse_timestamp(&request.timestamp).ok_or_else(|| {
            DomainError::Validation(ValidationError {
                field: "timestamp".to_string(),
                message: "not a valid ISO-8601 timestamp".to_string(),
            })
        })?;

        let metadata = match request.metadata {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(DomainError::Validation(ValidationError {
                    field: "metadata".to_string(),
                    message: "must be a JSON object".to_string(),
                }))
            }
            None => Map::new(),
        };

        Ok(ActivityEvent {
            user_id: request.user_id,
            event_type: request.event_type,
            occurred_at,
            metadata,
            dedup_key: request.dedup_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_request() -> TrackEventRequest {
        TrackEventRequest {
            user_id: 123,
            event_type: "page_view".to_string(),
            timestamp: "2026-02-20T10:00:00Z".to_string(),
            metadata: Some(json!({"device": "mobile"})),
            dedup_key: None,
        }
    }

    #[test]
    fn test_canonical_projection_is_lossless() {
        let event = ActivityEvent::try_from(valid_request()).unwrap();

        assert_eq!(event.user_id, 123);
        assert_eq!(event.event_type, "page_view");
        assert_eq!(event.occurred_at.to_rfc3339(), "2026-02-20T10:00:00+00:00");
        assert_eq!(event.metadata.get("device"), Some(&json!("mobile")));
    }

    #[test]
    fn test_naive_timestamp_assumed_utc() {
        let mut request = valid_request();
        request.timestamp = "2026-02-20T10:00:00.250".to_string();

        let event = ActivityEvent::try_from(request).unwrap();
        assert_eq!(event.occurred_at.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_missing_metadata_becomes_empty_map() {
        let mut request = valid_request();
        request.metadata = None;

        let event = ActivityEvent::try_from(request).unwrap();
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_unparsable_timestamp_rejected() {
        let mut request = valid_request();
        request.timestamp = "not-a-date".to_string();

        let result = ActivityEvent::try_from(request);
        match result {
            Err(DomainError::Validation(err)) => assert_eq!(err.field, "timestamp"),
            other => panic!("expected timestamp validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_wire_round_trip_preserves_all_fields() {
        let event = ActivityEvent {
            user_id: 42,
            event_type: "login".to_string(),
            occurred_at: "2026-02-20T10:00:00Z".parse().unwrap(),
            metadata: json!({"nested": {"a": [1, 2, 3]}, "flag": true})
                .as_object()
                .cloned()
                .unwrap(),
            dedup_key: Some("evt-42".to_string()),
        };

        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: ActivityEvent = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_invariant_check_rejects_bad_user_id() {
        let mut event = ActivityEvent::try_from(valid_request()).unwrap();
        event.user_id = 0;

        let err = event.check_invariants().unwrap_err();
        assert_eq!(err.field, "user_id");
    }

    #[test]
    fn test_invariant_check_rejects_oversized_event_type() {
        let mut event = ActivityEvent::try_from(valid_request()).unwrap();
        event.event_type = "x".repeat(EVENT_TYPE_MAX_LEN + 1);

        let err = event.check_invariants().unwrap_err();
        assert_eq!(err.field, "event_type");
    }
}
