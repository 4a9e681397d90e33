//! Wire types exchanged with the collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Every event this client produces is gameplay telemetry
pub const EVENT_CATEGORY: &str = "gameplay";

/// One telemetry event, immutable once stamped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub user_id: Uuid,
    pub session_id: Option<String>,
    pub event_type: String,
    pub event_name: String,
    pub event_category: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Stamp an event with identity and the current UTC time
    ///
    /// Non-object payloads are wrapped as `{"value": ...}` so the collector
    /// always receives a map.
    pub fn new(
        user_id: Uuid,
        session_id: Option<String>,
        event_type: impl Into<String>,
        event_name: impl Into<String>,
        payload: Value,
    ) -> Self {
        let payload = match payload {
            Value::Object(_) => payload,
            Value::Null => Value::Object(Map::new()),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Value::Object(map)
            }
        };

        Self {
            user_id,
            session_id,
            event_type: event_type.into(),
            event_name: event_name.into(),
            event_category: EVENT_CATEGORY.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /api/v1/events`
#[derive(Debug, Serialize)]
pub struct EventBatch<'a> {
    pub events: &'a [Event],
}

/// Collector's answer to a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchReceipt {
    #[serde(default)]
    pub inserted_count: usize,
    #[serde(default)]
    pub total_count: usize,
}

impl BatchReceipt {
    /// Events the collector refused individually
    pub fn rejected(&self) -> usize {
        self.total_count.saturating_sub(self.inserted_count)
    }
}
