//! Asterisk REST Interface (ARI) client for Rust
//!
//! This crate provides an async Rust client for Asterisk's REST Interface
//! (ARI), allowing applications to drive calls: answer channels, bridge
//! them, play media, record audio, originate outbound calls, update device
//! state and mailboxes, and react to real-time telephony events.
//!
//! # Architecture
//!
//! The client is schema-driven: at connect time it fetches the server's
//! Swagger 1.2-style API description and synthesizes every callable
//! operation from it — URL templates, parameter bindings, and response
//! typing all come from the description, never from hand-written tables.
//!
//! - [`AriClient`] (Clone + Send) — connect, resource namespaces, the
//!   global event bus, WebSocket lifecycle
//! - [`ResourceClient`] — operations of one resource class
//!   (`client.channels()`, `client.bridges()`, …)
//! - [`ResourceHandle`] — a live instance that is both an operation
//!   dispatcher (its identity is bound in automatically) and a scoped
//!   event emitter
//!
//! Events arrive on a single WebSocket and fan out three ways: the global
//! bus, per-instance scoped listeners, and managed-instance cleanup. The
//! WebSocket is kept alive with bounded exponential-backoff reconnects,
//! reported through the `WebSocketConnected`, `WebSocketReconnecting`, and
//! `WebSocketMaxRetries` lifecycle events.
//!
//! # Examples
//!
//! ## Connect and originate
//!
//! ```rust,no_run
//! use asterisk_ari_tokio::{AriClient, AriError};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AriError> {
//!     let client = AriClient::connect("http://localhost:8088", "asterisk", "secret").await?;
//!
//!     let outcome = client
//!         .channels()
//!         .invoke("originate", &json!({
//!             "endpoint": "PJSIP/softphone",
//!             "app": "my-app",
//!             "variables": {"CALLERID(name)": "Alice"},
//!         }))
//!         .await?;
//!
//!     if let Some(channel) = outcome.instance() {
//!         println!("originated channel {}", channel.id());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Instance auto-binding
//!
//! Operations invoked on an instance carry its identity automatically —
//! `bridge.invoke("create", …)` sends the instance's `bridgeId` without the
//! caller supplying it, and a caller-provided value cannot override it:
//!
//! ```rust,no_run
//! # async fn example(client: &asterisk_ari_tokio::AriClient) -> Result<(), asterisk_ari_tokio::AriError> {
//! use serde_json::json;
//!
//! let bridge = client.bridge();
//! bridge.invoke("create", &json!({"type": "holding"})).await?;
//! bridge.invoke("addChannel", &json!({"channel": "channel-id"})).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Scoped events and managed cleanup
//!
//! ```rust,no_run
//! use asterisk_ari_tokio::{AriClient, AriError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AriError> {
//!     let client = AriClient::connect("http://localhost:8088", "asterisk", "secret").await?;
//!
//!     client.on("StasisStart", move |_event, resources| {
//!         if let Some(channel) = resources.and_then(|r| r.single()) {
//!             // Only this channel's DTMF, cleaned up on StasisEnd.
//!             channel.manage();
//!             channel.on("ChannelDtmfReceived", |event, _| {
//!                 println!("digit: {}", event.digit().unwrap_or("?"));
//!             });
//!         }
//!     });
//!
//!     client.start(["my-app"]).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod constants;
pub mod error;
pub mod events;
pub mod resource;
pub mod schema;
pub mod transport;
pub mod types;

pub(crate) mod bus;
pub(crate) mod rest;

pub use bus::ListenerId;
pub use client::{AriClient, ResourceClient};
pub use error::{AriError, AriResult};
pub use events::{AriEvent, EventResources};
pub use resource::{ParseResourceTypeError, ResourceHandle, ResourceType};
pub use rest::OperationOutcome;
pub use schema::{
    ApiSchema, EventModel, EventProperty, OperationSpec, ParamLocation, ParamSpec, ResourceSchema,
    ResponseKind,
};
pub use transport::ReconnectConfig;
pub use types::{
    ChannelState, DeviceStateValue, ParseChannelStateError, ParseDeviceStateError,
    ParsePlaybackStateError, ParseRecordingStateError, PlaybackState, RecordingState,
};
