//! Protocol constants and configuration values

/// Default Asterisk HTTP/ARI port
pub const DEFAULT_ARI_PORT: u16 = 8088;

/// Root path of the REST surface on the server
pub const REST_PREFIX: &str = "/ari";

/// Path of the API description documents
pub const API_DOCS_PREFIX: &str = "/ari/api-docs";

/// Path of the event WebSocket
pub const EVENTS_PATH: &str = "/ari/events";

/// Client lifecycle event: the event WebSocket is open.
pub const EVENT_WEBSOCKET_CONNECTED: &str = "WebSocketConnected";
/// Client lifecycle event: the WebSocket dropped and a reconnect is scheduled.
pub const EVENT_WEBSOCKET_RECONNECTING: &str = "WebSocketReconnecting";
/// Client lifecycle event: the reconnect budget is exhausted.
pub const EVENT_WEBSOCKET_MAX_RETRIES: &str = "WebSocketMaxRetries";
/// Error-kind name for API description load failures, surfaced by
/// [`connect`](crate::AriClient::connect) as [`AriError::ApiLoad`](crate::AriError::ApiLoad).
pub const EVENT_API_LOAD_ERROR: &str = "APILoadError";

/// Delay before the first reconnection attempt, in milliseconds
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 100;

/// Upper bound on the reconnect backoff delay, in milliseconds
pub const RECONNECT_MAX_DELAY_MS: u64 = 10_000;

/// Reconnection attempts per outage before giving up
pub const RECONNECT_MAX_RETRIES: u32 = 10;

/// HTTP request timeout in milliseconds
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
