//! The dispatched event type

use serde::{Deserialize, Serialize};

/// Event type used when the stream does not name one
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type (`event:` field), `"message"` if the server sent none
    #[serde(rename = "type")]
    pub event_type: String,

    /// Joined `data:` lines
    pub data: Option<String>,
}

impl Event {
    /// Create an event with a type and a payload
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data.into()),
        }
    }

    /// Create a `message` event with a payload
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT_TYPE, data)
    }

    /// Payload as a string slice, empty if absent
    pub fn data_str(&self) -> &str {
        self.data.as_deref().unwrap_or_default()
    }

    /// Deserialize the payload as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(self.data_str())
    }
}

impl Default for Event {
    fn default() -> Self {
        Self {
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            data: None,
        }
    }
}
