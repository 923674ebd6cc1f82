//! Client facade: connect, resource namespaces, instance constructors,
//! the global event bus, and WebSocket lifecycle control.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::bus::{EventBus, ListenerId};
use crate::constants::DEFAULT_HTTP_TIMEOUT_MS;
use crate::error::{AriError, AriResult};
use crate::events::{AriEvent, EventResources};
use crate::resource::{ResourceHandle, ResourceType};
use crate::rest::{self, OperationOutcome};
use crate::schema::ApiSchema;
use crate::transport::{self, ReconnectConfig};

/// Immutable connection parameters.
pub(crate) struct ConnectionInfo {
    pub(crate) base_url: Url,
    pub(crate) username: String,
    pub(crate) password: String,
}

/// WebSocket controller state. `cancel` holds the token of the running
/// reader loop; `stop()` takes and cancels it.
#[derive(Default)]
pub(crate) struct WsState {
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) generation: u64,
}

/// State shared by the facade, every resource handle, and the reader task.
pub(crate) struct ClientInner {
    pub(crate) conn: ConnectionInfo,
    pub(crate) http: reqwest::Client,
    pub(crate) schema: ApiSchema,
    pub(crate) bus: EventBus,
    pub(crate) reconnect: ReconnectConfig,
    pub(crate) ws: Mutex<WsState>,
}

/// Handle to a connected ARI client (Clone + Send).
///
/// Created by [`connect`](Self::connect), which loads the server's API
/// description and synthesizes the operation surface from it. The event
/// WebSocket is opened separately with [`start`](Self::start).
///
/// ```rust,no_run
/// use asterisk_ari_tokio::AriClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), asterisk_ari_tokio::AriError> {
///     let client = AriClient::connect("http://localhost:8088", "asterisk", "secret").await?;
///
///     client.on("StasisStart", |_event, resources| {
///         if let Some(channel) = resources.and_then(|r| r.single()) {
///             println!("channel {} entered the application", channel.id());
///         }
///     });
///
///     client.start(["my-app"]).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AriClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for AriClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AriClient")
            .field("base_url", &self.inner.conn.base_url.as_str())
            .field("started", &self.is_started())
            .finish()
    }
}

impl AriClient {
    /// Connect to an ARI server and load its API description.
    ///
    /// `url` is the server root (e.g. `http://pbx.example.com:8088`); the
    /// `/ari` prefix is added by the client. The WebSocket is not opened
    /// until [`start`](Self::start).
    ///
    /// Fails with [`AriError::Unreachable`] when the host cannot be reached
    /// and [`AriError::ApiLoad`] when the description cannot be fetched or
    /// parsed.
    pub async fn connect(url: &str, username: &str, password: &str) -> AriResult<AriClient> {
        Self::connect_with_config(url, username, password, ReconnectConfig::default()).await
    }

    /// Like [`connect`](Self::connect), with a custom reconnect schedule.
    pub async fn connect_with_config(
        url: &str,
        username: &str,
        password: &str,
        reconnect: ReconnectConfig,
    ) -> AriResult<AriClient> {
        let base_url = Url::parse(url)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS))
            .build()
            .map_err(|e| AriError::protocol(format!("failed to build HTTP client: {}", e)))?;

        info!("connecting to ARI at {}", base_url);
        let schema = ApiSchema::load(&http, &base_url, username, password).await?;
        info!(
            api_version = schema
                .api_version()
                .unwrap_or("unknown"),
            resources = schema
                .resource_names()
                .len(),
            "API description loaded"
        );

        Ok(AriClient {
            inner: Arc::new(ClientInner {
                conn: ConnectionInfo {
                    base_url,
                    username: username.to_string(),
                    password: password.to_string(),
                },
                http,
                schema,
                bus: EventBus::new(),
                reconnect,
                ws: Mutex::new(WsState::default()),
            }),
        })
    }

    /// The loaded API description.
    pub fn schema(&self) -> &ApiSchema {
        &self.inner.schema
    }

    /// Open the event WebSocket for one or more Stasis applications.
    ///
    /// The initial connection is made before this returns; its failure is
    /// returned directly. After that the connection is kept alive with
    /// bounded exponential-backoff reconnects, reported through the
    /// `WebSocketConnected` / `WebSocketReconnecting` / `WebSocketMaxRetries`
    /// lifecycle events.
    pub async fn start<I, S>(&self, apps: I) -> AriResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let apps = apps
            .into_iter()
            .map(|app| {
                app.as_ref()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join(",");
        if apps.is_empty() {
            return Err(AriError::websocket(
                "at least one application name is required",
            ));
        }
        transport::start(self.inner.clone(), apps).await
    }

    /// Close the event WebSocket and inhibit reconnection. Idempotent;
    /// [`start`](Self::start) may be called again afterwards.
    pub fn stop(&self) {
        let mut ws = self
            .inner
            .ws
            .lock()
            .unwrap();
        if let Some(token) = ws.cancel.take() {
            info!("stopping event WebSocket");
            token.cancel();
        }
    }

    /// Whether the event WebSocket loop is currently running.
    pub fn is_started(&self) -> bool {
        self.inner
            .ws
            .lock()
            .unwrap()
            .cancel
            .is_some()
    }

    // ── Global event bus ─────────────────────────────────────────────

    /// Register a listener for an event name. Any number of listeners may
    /// be registered for the same event.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&AriEvent, Option<&EventResources>) + Send + Sync + 'static,
    {
        self.inner
            .bus
            .subscribe(&event.into(), false, Arc::new(listener))
    }

    /// Like [`on`](Self::on), but the listener fires at most once.
    pub fn once<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&AriEvent, Option<&EventResources>) + Send + Sync + 'static,
    {
        self.inner
            .bus
            .subscribe(&event.into(), true, Arc::new(listener))
    }

    /// Remove a listener. A no-op when the listener is not registered.
    pub fn remove_listener(&self, event: &str, id: ListenerId) {
        self.inner
            .bus
            .remove(event, id);
    }

    /// Remove every global listener for the named event.
    pub fn remove_all_listeners(&self, event: &str) {
        self.inner
            .bus
            .remove_all_global(event);
    }

    // ── Resource namespaces ──────────────────────────────────────────

    /// A namespace cursor for any resource class the description declares.
    ///
    /// Operation existence is checked at invocation time, so this never
    /// fails for an unknown name — the invocation does.
    pub fn resource(&self, name: impl Into<String>) -> ResourceClient {
        ResourceClient {
            inner: self.inner.clone(),
            name: name.into(),
        }
    }

    /// The `asterisk` resource namespace.
    pub fn asterisk(&self) -> ResourceClient {
        self.resource("asterisk")
    }

    /// The `applications` resource namespace.
    pub fn applications(&self) -> ResourceClient {
        self.resource("applications")
    }

    /// The `bridges` resource namespace.
    pub fn bridges(&self) -> ResourceClient {
        self.resource("bridges")
    }

    /// The `channels` resource namespace.
    pub fn channels(&self) -> ResourceClient {
        self.resource("channels")
    }

    /// The `deviceStates` resource namespace.
    pub fn device_states(&self) -> ResourceClient {
        self.resource("deviceStates")
    }

    /// The `endpoints` resource namespace.
    pub fn endpoints(&self) -> ResourceClient {
        self.resource("endpoints")
    }

    /// The `events` resource namespace.
    pub fn events(&self) -> ResourceClient {
        self.resource("events")
    }

    /// The `mailboxes` resource namespace.
    pub fn mailboxes(&self) -> ResourceClient {
        self.resource("mailboxes")
    }

    /// The `playbacks` resource namespace.
    pub fn playbacks(&self) -> ResourceClient {
        self.resource("playbacks")
    }

    /// The `recordings` resource namespace.
    pub fn recordings(&self) -> ResourceClient {
        self.resource("recordings")
    }

    /// The `sounds` resource namespace.
    pub fn sounds(&self) -> ResourceClient {
        self.resource("sounds")
    }

    // ── Instance constructors ────────────────────────────────────────

    /// Construct an instance of any resource type, with a fresh UUID
    /// identity when `identity` is `None`.
    pub fn instance(&self, kind: ResourceType, identity: Option<&str>) -> ResourceHandle {
        ResourceHandle::new(self.inner.clone(), kind, identity.map(String::from))
    }

    /// A channel instance with a fresh UUID identity.
    pub fn channel(&self) -> ResourceHandle {
        self.instance(ResourceType::Channel, None)
    }

    /// A channel instance with the given id.
    pub fn channel_with_id(&self, id: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::Channel, Some(id.as_ref()))
    }

    /// A bridge instance with a fresh UUID identity.
    pub fn bridge(&self) -> ResourceHandle {
        self.instance(ResourceType::Bridge, None)
    }

    /// A bridge instance with the given id.
    pub fn bridge_with_id(&self, id: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::Bridge, Some(id.as_ref()))
    }

    /// A playback instance with a fresh UUID identity.
    pub fn playback(&self) -> ResourceHandle {
        self.instance(ResourceType::Playback, None)
    }

    /// A playback instance with the given id.
    pub fn playback_with_id(&self, id: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::Playback, Some(id.as_ref()))
    }

    /// A live recording instance with a fresh UUID identity.
    pub fn live_recording(&self) -> ResourceHandle {
        self.instance(ResourceType::LiveRecording, None)
    }

    /// A live recording instance with the given name.
    pub fn live_recording_with_name(&self, name: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::LiveRecording, Some(name.as_ref()))
    }

    /// A mailbox instance with a fresh UUID identity.
    pub fn mailbox(&self) -> ResourceHandle {
        self.instance(ResourceType::Mailbox, None)
    }

    /// A mailbox instance with the given name.
    pub fn mailbox_with_name(&self, name: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::Mailbox, Some(name.as_ref()))
    }

    /// An endpoint instance with the given identity
    /// (conventionally `technology/resource`).
    pub fn endpoint_with_name(&self, name: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::Endpoint, Some(name.as_ref()))
    }

    /// A device state instance with a fresh UUID identity.
    pub fn device_state(&self) -> ResourceHandle {
        self.instance(ResourceType::DeviceState, None)
    }

    /// A device state instance with the given name.
    pub fn device_state_with_name(&self, name: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::DeviceState, Some(name.as_ref()))
    }

    /// A sound instance with the given name.
    pub fn sound_with_name(&self, name: impl AsRef<str>) -> ResourceHandle {
        self.instance(ResourceType::Sound, Some(name.as_ref()))
    }

    // ── Test support ─────────────────────────────────────────────────

    #[cfg(test)]
    pub(crate) fn test_with_schema(schema: ApiSchema) -> AriClient {
        AriClient {
            inner: Arc::new(ClientInner {
                conn: ConnectionInfo {
                    base_url: Url::parse("http://127.0.0.1:8088").unwrap(),
                    username: "test".to_string(),
                    password: "test".to_string(),
                },
                http: reqwest::Client::new(),
                schema,
                bus: EventBus::new(),
                reconnect: ReconnectConfig::default(),
                ws: Mutex::new(WsState::default()),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> Arc<ClientInner> {
        self.inner.clone()
    }
}

/// Cursor for one resource class's operations (`client.channels()`,
/// `client.bridges()`, …).
///
/// The operation set is exactly what the API description declares; nothing
/// is hand-written into the client.
#[derive(Clone)]
pub struct ResourceClient {
    inner: Arc<ClientInner>,
    name: String,
}

impl fmt::Debug for ResourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClient")
            .field("resource", &self.name)
            .finish()
    }
}

impl ResourceClient {
    /// Resource name this cursor addresses.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operation nicknames the description declares for this resource.
    /// Empty when the resource is unknown.
    pub fn operations(&self) -> Vec<String> {
        self.inner
            .schema
            .resource(&self.name)
            .map(|resource| {
                resource
                    .operation_names()
                    .into_iter()
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the description declares the named operation.
    pub fn has_operation(&self, operation: &str) -> bool {
        self.inner
            .schema
            .resource(&self.name)
            .and_then(|resource| resource.operation(operation))
            .is_some()
    }

    /// Invoke an operation with the given options map.
    ///
    /// `options` is a JSON object of parameter values; anything else counts
    /// as an empty map. The caller's value is never mutated.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &asterisk_ari_tokio::AriClient) -> Result<(), asterisk_ari_tokio::AriError> {
    /// use serde_json::json;
    ///
    /// let outcome = client
    ///     .channels()
    ///     .invoke("originate", &json!({
    ///         "endpoint": "PJSIP/softphone",
    ///         "app": "my-app",
    ///         "variables": {"CALLERID(name)": "Alice"},
    ///     }))
    ///     .await?;
    /// if let Some(channel) = outcome.instance() {
    ///     println!("originated {}", channel.id());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn invoke(&self, operation: &str, options: &Value) -> AriResult<OperationOutcome> {
        rest::invoke(&self.inner, &self.name, operation, options).await
    }
}
