//! Resource classes and live instance handles.
//!
//! A [`ResourceHandle`] is both an operation dispatcher (its identity is
//! bound into every invocation automatically) and a scoped event emitter
//! (listeners registered on it fire only for events referencing the same
//! identity).

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::bus::{EventCallback, ListenerId};
use crate::client::ClientInner;
use crate::error::AriResult;
use crate::events::{AriEvent, EventResources};
use crate::rest::{self, OperationOutcome};
use crate::types::{ChannelState, DeviceStateValue, PlaybackState, RecordingState};

/// The resource classes this client materializes as typed instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResourceType {
    /// A call leg.
    Channel,
    /// A mixing bridge.
    Bridge,
    /// An in-progress media playback.
    Playback,
    /// An in-progress recording.
    LiveRecording,
    /// A voicemail box.
    Mailbox,
    /// A remote endpoint (technology + resource).
    Endpoint,
    /// A device state entry.
    DeviceState,
    /// An installed sound file.
    Sound,
}

impl ResourceType {
    /// Every known resource type.
    pub const ALL: [ResourceType; 8] = [
        ResourceType::Channel,
        ResourceType::Bridge,
        ResourceType::Playback,
        ResourceType::LiveRecording,
        ResourceType::Mailbox,
        ResourceType::Endpoint,
        ResourceType::DeviceState,
        ResourceType::Sound,
    ];

    /// Model name used by the API description (`Channel`, `LiveRecording`, …).
    pub fn model_name(&self) -> &'static str {
        match self {
            ResourceType::Channel => "Channel",
            ResourceType::Bridge => "Bridge",
            ResourceType::Playback => "Playback",
            ResourceType::LiveRecording => "LiveRecording",
            ResourceType::Mailbox => "Mailbox",
            ResourceType::Endpoint => "Endpoint",
            ResourceType::DeviceState => "DeviceState",
            ResourceType::Sound => "Sound",
        }
    }

    /// Parse a model name from the API description.
    pub fn from_model_name(s: &str) -> Option<Self> {
        match s {
            "Channel" => Some(ResourceType::Channel),
            "Bridge" => Some(ResourceType::Bridge),
            "Playback" => Some(ResourceType::Playback),
            "LiveRecording" => Some(ResourceType::LiveRecording),
            "Mailbox" => Some(ResourceType::Mailbox),
            "Endpoint" => Some(ResourceType::Endpoint),
            "DeviceState" => Some(ResourceType::DeviceState),
            "Sound" => Some(ResourceType::Sound),
            _ => None,
        }
    }

    /// REST resource name this type's operations live under.
    pub fn resource_name(&self) -> &'static str {
        match self {
            ResourceType::Channel => "channels",
            ResourceType::Bridge => "bridges",
            ResourceType::Playback => "playbacks",
            ResourceType::LiveRecording => "recordings",
            ResourceType::Mailbox => "mailboxes",
            ResourceType::Endpoint => "endpoints",
            ResourceType::DeviceState => "deviceStates",
            ResourceType::Sound => "sounds",
        }
    }

    /// The payload attribute that carries this type's identity.
    pub fn identity_attribute(&self) -> &'static str {
        match self {
            ResourceType::Channel | ResourceType::Bridge | ResourceType::Playback => "id",
            _ => "name",
        }
    }

    /// The operation parameter an instance's identity is bound to.
    ///
    /// `None` for endpoints — their operations address `tech` + `resource`
    /// separately, so they are exposed unbound.
    pub fn bound_parameter(&self) -> Option<&'static str> {
        match self {
            ResourceType::Channel => Some("channelId"),
            ResourceType::Bridge => Some("bridgeId"),
            ResourceType::Playback => Some("playbackId"),
            ResourceType::LiveRecording => Some("recordingName"),
            ResourceType::Mailbox => Some("mailboxName"),
            ResourceType::Endpoint => None,
            ResourceType::DeviceState => Some("deviceName"),
            ResourceType::Sound => Some("soundId"),
        }
    }

    /// Events that conclude an instance's lifetime for listener cleanup.
    pub fn terminal_events(&self) -> &'static [&'static str] {
        match self {
            ResourceType::Channel => &["StasisEnd"],
            ResourceType::Bridge => &["BridgeDestroyed"],
            ResourceType::Playback => &["PlaybackFinished"],
            ResourceType::LiveRecording => &["RecordingFinished", "RecordingFailed"],
            _ => &[],
        }
    }

    /// The type whose instances an event name is terminal for, if any.
    pub(crate) fn for_terminal_event(event: &str) -> Option<ResourceType> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|rt| {
                rt.terminal_events()
                    .contains(&event)
            })
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Error returned when parsing an invalid resource model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResourceTypeError(pub String);

impl fmt::Display for ParseResourceTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resource type: {}", self.0)
    }
}

impl std::error::Error for ParseResourceTypeError {}

impl FromStr for ResourceType {
    type Err = ParseResourceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_model_name(s).ok_or_else(|| ParseResourceTypeError(s.to_string()))
    }
}

/// Pull an instance's identity out of a payload object.
///
/// Endpoints have no single identity field on the wire; `technology/resource`
/// is used when both are present, falling back to a `name` field.
pub(crate) fn extract_identity(kind: ResourceType, fields: &serde_json::Map<String, Value>) -> Option<String> {
    if kind == ResourceType::Endpoint {
        let tech = fields
            .get("technology")
            .and_then(Value::as_str);
        let resource = fields
            .get("resource")
            .and_then(Value::as_str);
        if let (Some(tech), Some(resource)) = (tech, resource) {
            return Some(format!("{}/{}", tech, resource));
        }
    }

    match fields.get(kind.identity_attribute()) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// A live instance of one resource class.
///
/// Handles are cheap to clone; clones share the field map. Two handles with
/// the same identity need not be the same object — scoped listeners and the
/// managed flag are keyed by identity on the client, not by handle.
#[derive(Clone)]
pub struct ResourceHandle {
    client: Arc<ClientInner>,
    kind: ResourceType,
    key: String,
    fields: Arc<Mutex<serde_json::Map<String, Value>>>,
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &self.kind)
            .field("id", &self.key)
            .finish()
    }
}

impl ResourceHandle {
    /// Construct with a caller-supplied identity, or a fresh UUID v4 when
    /// `key` is `None`.
    pub(crate) fn new(client: Arc<ClientInner>, kind: ResourceType, key: Option<String>) -> Self {
        let key = key.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut fields = serde_json::Map::new();
        fields.insert(
            kind.identity_attribute()
                .to_string(),
            Value::String(key.clone()),
        );
        Self {
            client,
            kind,
            key,
            fields: Arc::new(Mutex::new(fields)),
        }
    }

    /// Materialize an instance from a server payload (operation response
    /// or event property). A payload without an identity gets a fresh one.
    pub(crate) fn from_value(client: Arc<ClientInner>, kind: ResourceType, value: &Value) -> Self {
        let fields = match value.as_object() {
            Some(map) => map.clone(),
            None => serde_json::Map::new(),
        };
        let key = extract_identity(kind, &fields);
        let handle = Self::new(client, kind, key);
        {
            let mut own = handle
                .fields
                .lock()
                .unwrap();
            for (name, value) in fields {
                own.insert(name, value);
            }
        }
        handle
    }

    /// The resource class of this instance.
    pub fn kind(&self) -> ResourceType {
        self.kind
    }

    /// The identity key — the `id` field for channels, bridges, and
    /// playbacks, the `name` field for the other types.
    pub fn id(&self) -> &str {
        &self.key
    }

    /// Last-known value of a server-side attribute, if any.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields
            .lock()
            .unwrap()
            .get(name)
            .cloned()
    }

    /// Last-known value of a string attribute.
    pub fn str_field(&self, name: &str) -> Option<String> {
        match self.field(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Snapshot of the whole field map.
    pub fn fields(&self) -> serde_json::Map<String, Value> {
        self.fields
            .lock()
            .unwrap()
            .clone()
    }

    /// Merge the fields of a JSON object into this instance's field map.
    /// Non-object values are ignored. The identity attribute always keeps
    /// the identity the instance was constructed with.
    pub fn update(&self, values: &Value) {
        if let Some(map) = values.as_object() {
            let mut own = self
                .fields
                .lock()
                .unwrap();
            for (name, value) in map {
                own.insert(name.clone(), value.clone());
            }
            own.insert(
                self.kind
                    .identity_attribute()
                    .to_string(),
                Value::String(self.key.clone()),
            );
        }
    }

    /// Invoke an operation of this instance's resource class with the
    /// identity bound in automatically.
    ///
    /// The bound parameter (e.g. `channelId`) is injected after the caller's
    /// options are copied and cannot be overridden. If the operation returns
    /// this same instance, the response fields are merged into the field map.
    pub async fn invoke(&self, operation: &str, options: &Value) -> AriResult<OperationOutcome> {
        let outcome = rest::invoke_bound(
            &self.client,
            self.kind,
            &self.key,
            operation,
            options,
        )
        .await?;

        if let OperationOutcome::Instance(handle) = &outcome {
            if handle.kind == self.kind && handle.key == self.key {
                self.update(&Value::Object(handle.fields()));
            }
        }

        Ok(outcome)
    }

    /// Register a listener for events referencing this instance's identity.
    ///
    /// The listener fires only when the named event promotes an instance of
    /// this type with the same identity.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&AriEvent, Option<&EventResources>) + Send + Sync + 'static,
    {
        self.subscribe(event.into(), false, Arc::new(listener))
    }

    /// Like [`on`](Self::on), but the listener fires at most once.
    pub fn once<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&AriEvent, Option<&EventResources>) + Send + Sync + 'static,
    {
        self.subscribe(event.into(), true, Arc::new(listener))
    }

    fn subscribe(&self, event: String, once: bool, callback: EventCallback) -> ListenerId {
        self.client
            .bus
            .subscribe_scoped(&event, self.kind, &self.key, once, callback)
    }

    /// Remove a scoped listener. A no-op when the listener is not (or no
    /// longer) registered.
    pub fn remove_listener(&self, event: &str, id: ListenerId) {
        self.client
            .bus
            .remove(event, id);
    }

    /// Remove every scoped listener this identity has for the named event.
    pub fn remove_all_listeners(&self, event: &str) {
        self.client
            .bus
            .remove_scoped_for(event, self.kind, &self.key);
    }

    /// Mark this identity as managed: when its terminal event arrives
    /// (`StasisEnd` for channels, `BridgeDestroyed` for bridges, …) all of
    /// its scoped listeners are removed automatically.
    ///
    /// The managed flag is shared by every handle with the same identity.
    pub fn manage(&self) {
        self.client
            .bus
            .manage(self.kind, &self.key);
    }

    /// Whether this identity is currently in the managed set.
    pub fn is_managed(&self) -> bool {
        self.client
            .bus
            .is_managed(self.kind, &self.key)
    }

    // ── Typed field accessors ────────────────────────────────────────

    /// Parse the `state` field of a channel instance.
    pub fn channel_state(&self) -> Option<ChannelState> {
        if self.kind != ResourceType::Channel {
            return None;
        }
        self.parse_state()
    }

    /// Parse the `state` field of a deviceState instance.
    pub fn device_state(&self) -> Option<DeviceStateValue> {
        if self.kind != ResourceType::DeviceState {
            return None;
        }
        self.parse_state()
    }

    /// Parse the `state` field of a playback instance.
    pub fn playback_state(&self) -> Option<PlaybackState> {
        if self.kind != ResourceType::Playback {
            return None;
        }
        self.parse_state()
    }

    /// Parse the `state` field of a live recording instance.
    pub fn recording_state(&self) -> Option<RecordingState> {
        if self.kind != ResourceType::LiveRecording {
            return None;
        }
        self.parse_state()
    }

    fn parse_state<T: FromStr>(&self) -> Option<T> {
        self.str_field("state")?
            .parse()
            .ok()
    }
}
