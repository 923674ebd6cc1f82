//! ARI event frames and the resource instances promoted from them.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{AriError, AriResult};
use crate::resource::ResourceHandle;

/// One event received on the WebSocket (or synthesized by the client for
/// its own lifecycle notifications).
///
/// The full JSON payload is retained; accessors read the fields every ARI
/// event family carries, plus a few common model-specific ones. Anything
/// else is reachable through [`field`](Self::field).
#[derive(Debug, Clone)]
pub struct AriEvent {
    name: String,
    payload: Value,
}

impl AriEvent {
    /// Parse a WebSocket text frame. The envelope must be a JSON object
    /// with a `type` string.
    pub(crate) fn from_frame(text: &str) -> AriResult<Self> {
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| AriError::protocol(format!("unparseable event frame: {}", e)))?;
        let name = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| AriError::protocol("event frame has no type field"))?
            .to_string();
        Ok(Self { name, payload })
    }

    /// Build a client-generated lifecycle event (`WebSocketConnected`, …).
    pub(crate) fn synthetic(name: &str, fields: Value) -> Self {
        let mut map = match fields {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        map.insert("type".to_string(), Value::String(name.to_string()));
        Self {
            name: name.to_string(),
            payload: Value::Object(map),
        }
    }

    /// Event name, matching the frame's `type` field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this event has the given name.
    pub fn is_type(&self, name: &str) -> bool {
        self.name == name
    }

    /// The full JSON payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Look up a top-level field of the payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload
            .get(name)
    }

    /// Look up a top-level string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(Value::as_str)
    }

    /// `application` field — the Stasis application this event belongs to.
    pub fn application(&self) -> Option<&str> {
        self.str_field("application")
    }

    /// `timestamp` field, as sent by the server.
    pub fn timestamp(&self) -> Option<&str> {
        self.str_field("timestamp")
    }

    /// `digit` field of `ChannelDtmfReceived`.
    pub fn digit(&self) -> Option<&str> {
        self.str_field("digit")
    }

    /// `cause` field of `ChannelDestroyed` / `ChannelHangupRequest`.
    pub fn cause(&self) -> Option<i64> {
        self.field("cause")
            .and_then(Value::as_i64)
    }

    /// `id` of the embedded `channel` object, when present.
    pub fn channel_id(&self) -> Option<&str> {
        self.embedded_str("channel", "id")
    }

    /// `id` of the embedded `bridge` object, when present.
    pub fn bridge_id(&self) -> Option<&str> {
        self.embedded_str("bridge", "id")
    }

    /// `id` of the embedded `playback` object, when present.
    pub fn playback_id(&self) -> Option<&str> {
        self.embedded_str("playback", "id")
    }

    /// `name` of the embedded `recording` object, when present.
    pub fn recording_name(&self) -> Option<&str> {
        self.embedded_str("recording", "name")
    }

    /// `error` field of client lifecycle events.
    pub fn error_message(&self) -> Option<&str> {
        self.str_field("error")
    }

    fn embedded_str(&self, object: &str, field: &str) -> Option<&str> {
        self.field(object)?
            .get(field)?
            .as_str()
    }
}

/// The promoted resources delivered alongside an event.
///
/// Shape follows the promotion count: one promoted property yields the
/// instance itself, two or more yield a property-name → instance map.
#[derive(Debug, Clone)]
pub enum EventResources {
    /// Exactly one property promoted.
    Single(ResourceHandle),
    /// Two or more properties promoted, keyed by property name.
    Many(HashMap<String, ResourceHandle>),
}

impl EventResources {
    /// The instance, when exactly one property promoted.
    pub fn single(&self) -> Option<&ResourceHandle> {
        match self {
            EventResources::Single(handle) => Some(handle),
            EventResources::Many(_) => None,
        }
    }

    /// Look up a promoted instance by property name (`channel`, `bridge`, …).
    pub fn get(&self, property: &str) -> Option<&ResourceHandle> {
        match self {
            EventResources::Single(_) => None,
            EventResources::Many(map) => map.get(property),
        }
    }

    /// All promoted instances, in no particular order for the map case.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &ResourceHandle> + '_> {
        match self {
            EventResources::Single(handle) => Box::new(std::iter::once(handle)),
            EventResources::Many(map) => Box::new(map.values()),
        }
    }

    /// Number of promoted instances.
    pub fn len(&self) -> usize {
        match self {
            EventResources::Single(_) => 1,
            EventResources::Many(map) => map.len(),
        }
    }

    /// Always `false`: zero promotions are represented as `None`, not as
    /// an empty `EventResources`.
    pub fn is_empty(&self) -> bool {
        false
    }
}
