use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::Result;

/// Name of the discriminator field carried by every message.
pub const TYPE_FIELD: &str = "type";

/// Event type dispatched once the reconnect budget is exhausted.
pub const CONNECTION_FAILED: &str = "connection_failed";

/// Reason attached to [`CONNECTION_FAILED`] events.
pub const MAX_ATTEMPTS_REACHED: &str = "max_attempts_reached";

/// A parsed inbound message.
///
/// The manager only guarantees that the frame was valid JSON and carried a string `type`;
/// the payload is the whole object and its shape is up to the subscriber.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_type: String,
    payload: Value,
}

impl Event {
    /// Build an event from a JSON object, returning `None` when it has no string `type`.
    #[must_use]
    pub fn from_object(object: Map<String, Value>) -> Option<Self> {
        let event_type = object.get(TYPE_FIELD)?.as_str()?.to_owned();
        Some(Self {
            event_type,
            payload: Value::Object(object),
        })
    }

    pub(crate) fn connection_failed(reason: &str) -> Self {
        Self {
            event_type: CONNECTION_FAILED.to_owned(),
            payload: json!({ "type": CONNECTION_FAILED, "reason": reason }),
        }
    }

    /// The discriminator value.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The full parsed message, discriminator included.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Deserialize the payload into a typed message.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Parse a raw frame into events.
///
/// Whitespace-only frames are keepalives and yield nothing. A JSON array yields one event per
/// element. Elements that are not objects with a string `type` are skipped; invalid JSON is an
/// error.
pub fn parse_events(bytes: &[u8]) -> Result<Vec<Event>> {
    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(&[][..], |start| &bytes[start..]);

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let values = match serde_json::from_slice::<Value>(trimmed)? {
        Value::Array(values) => values,
        value => vec![value],
    };

    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(object) => {
                let event = Event::from_object(object);
                if event.is_none() {
                    tracing::debug!("Discarding message without a string type");
                }
                event
            }
            other => {
                tracing::debug!(%other, "Discarding non-object message");
                None
            }
        })
        .collect())
}
