//! WebSocket event transport with bounded exponential-backoff reconnect.
//!
//! One WebSocket carries every event. The reader task dispatches frames to
//! the demultiplexer in arrival order and emits the client lifecycle events
//! (`WebSocketConnected`, `WebSocketReconnecting`, `WebSocketMaxRetries`).
//! `stop()` cancels the token; a cancelled loop never reconnects.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::client::ClientInner;
use crate::constants::{
    EVENTS_PATH, EVENT_WEBSOCKET_CONNECTED, EVENT_WEBSOCKET_MAX_RETRIES,
    EVENT_WEBSOCKET_RECONNECTING, RECONNECT_INITIAL_DELAY_MS, RECONNECT_MAX_DELAY_MS,
    RECONNECT_MAX_RETRIES,
};
use crate::error::{AriError, AriResult};
use crate::events::AriEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Exponential backoff configuration for WebSocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 100 ms.
    pub initial_delay: Duration,

    /// Upper bound on the backoff delay. Default: 10 s.
    pub max_delay: Duration,

    /// Reconnection attempts per outage before giving up. Default: 10.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(RECONNECT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            max_retries: RECONNECT_MAX_RETRIES,
        }
    }
}

/// `delay = min(initial * 2^attempt, max)`
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config
        .initial_delay
        .as_millis() as u64;
    let max = config
        .max_delay
        .as_millis() as u64;
    let delay = base.saturating_mul(1u64 << attempt.min(32));
    Duration::from_millis(delay.min(max))
}

/// Build the event WebSocket URL for a set of applications.
pub(crate) fn events_url(
    base: &Url,
    apps: &str,
    username: &str,
    password: &str,
) -> AriResult<Url> {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| AriError::websocket(format!("cannot derive a WebSocket URL from {}", base)))?;
    url.set_path(EVENTS_PATH);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("app", apps)
        .append_pair("api_key", &format!("{}:{}", username, password));
    Ok(url)
}

/// Open the WebSocket for `apps` and spawn the reader loop.
///
/// The initial connection is made inline so its failure surfaces to the
/// caller; reconnects after that are the loop's business.
pub(crate) async fn start(client: Arc<ClientInner>, apps: String) -> AriResult<()> {
    let (cancel, generation) = {
        let mut ws = client
            .ws
            .lock()
            .unwrap();
        if ws.cancel.is_some() {
            return Err(AriError::websocket("WebSocket already started"));
        }
        let token = CancellationToken::new();
        ws.cancel = Some(token.clone());
        ws.generation += 1;
        (token, ws.generation)
    };

    let url = events_url(
        &client.conn.base_url,
        &apps,
        &client.conn.username,
        &client.conn.password,
    )?;
    info!(app = apps.as_str(), "opening event WebSocket");

    let stream = match connect_ws(&url).await {
        Ok(stream) => stream,
        Err(e) => {
            let mut ws = client
                .ws
                .lock()
                .unwrap();
            if ws.generation == generation {
                ws.cancel = None;
            }
            return Err(e);
        }
    };

    emit_lifecycle(&client, EVENT_WEBSOCKET_CONNECTED, json!({ "application": apps }));

    let loop_client = client.clone();
    tokio::spawn(async move {
        ws_loop(loop_client.clone(), url, stream, cancel).await;
        let mut ws = loop_client
            .ws
            .lock()
            .unwrap();
        if ws.generation == generation {
            ws.cancel = None;
        }
    });

    Ok(())
}

async fn connect_ws(url: &Url) -> AriResult<WsStream> {
    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| AriError::websocket(e.to_string()))?;
    Ok(stream)
}

/// Why a single connection's read phase ended.
enum ReadEnd {
    Cancelled,
    Closed(String),
}

/// Main loop: read → on drop, backoff → reconnect, until cancelled or the
/// retry budget runs out.
async fn ws_loop(client: Arc<ClientInner>, url: Url, initial: WsStream, cancel: CancellationToken) {
    let config = client.reconnect.clone();
    let mut current = Some(initial);
    let mut attempt: u32 = 0;
    let mut last_error = String::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match current.take() {
            Some(stream) => match read_frames(&client, stream, &cancel).await {
                ReadEnd::Cancelled => break,
                ReadEnd::Closed(reason) => {
                    warn!(reason = reason.as_str(), "WebSocket dropped");
                    last_error = reason;
                }
            },
            None => {
                if attempt >= config.max_retries {
                    info!(
                        max_retries = config.max_retries,
                        "WebSocket reconnection limit reached, giving up"
                    );
                    emit_lifecycle(
                        &client,
                        EVENT_WEBSOCKET_MAX_RETRIES,
                        json!({ "error": last_error }),
                    );
                    break;
                }

                emit_lifecycle(
                    &client,
                    EVENT_WEBSOCKET_RECONNECTING,
                    json!({ "error": last_error, "attempt": attempt }),
                );

                let delay = backoff_delay(attempt, &config);
                debug!(
                    delay_ms = delay.as_millis() as u64,
                    attempt, "waiting before reconnect"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
                match connect_ws(&url).await {
                    Ok(stream) => {
                        attempt = 0;
                        emit_lifecycle(&client, EVENT_WEBSOCKET_CONNECTED, json!({}));
                        current = Some(stream);
                    }
                    Err(e) => {
                        last_error = e.to_string();
                    }
                }
            }
        }
    }

    debug!("WebSocket loop exiting");
}

/// Read frames from one connection until it drops or the client stops.
async fn read_frames(
    client: &Arc<ClientInner>,
    stream: WsStream,
    cancel: &CancellationToken,
) -> ReadEnd {
    let (_write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadEnd::Cancelled,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    trace!(frame = text.as_str(), "event frame");
                    // A panicking listener must not take the reader down.
                    let dispatch = std::panic::AssertUnwindSafe(|| {
                        client
                            .bus
                            .dispatch_frame(client, &text);
                    });
                    if std::panic::catch_unwind(dispatch).is_err() {
                        tracing::error!("event listener panicked");
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite answers pings automatically
                    trace!("WebSocket ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                    } else {
                        info!("WebSocket close frame received (no payload)");
                    }
                    return ReadEnd::Closed("connection closed by server".to_string());
                }
                Some(Err(e)) => {
                    return ReadEnd::Closed(e.to_string());
                }
                None => {
                    return ReadEnd::Closed("WebSocket stream ended".to_string());
                }
                _ => {
                    // Binary, Pong, Frame — ignore
                }
            }
        }
    }
}

/// Emit one client lifecycle event through the normal dispatch path.
pub(crate) fn emit_lifecycle(client: &Arc<ClientInner>, name: &str, fields: serde_json::Value) {
    let event = AriEvent::synthetic(name, fields);
    client
        .bus
        .dispatch(client, &event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn backoff_doubles_from_the_initial_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(backoff_delay(0, &config), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, &config), Duration::from_millis(200));
        assert_eq!(backoff_delay(2, &config), Duration::from_millis(400));
        assert_eq!(backoff_delay(3, &config), Duration::from_millis(800));
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(backoff_delay(20, &config), Duration::from_secs(10));
        assert_eq!(backoff_delay(63, &config), Duration::from_secs(10));
    }

    #[test]
    fn events_url_carries_apps_and_credentials() {
        let base = Url::parse("http://ari.local:8088").unwrap();
        let url = events_url(&base, "app1,app2", "asterisk", "secret").unwrap();

        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/ari/events");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("app".to_string(), "app1,app2".to_string())));
        assert!(pairs.contains(&("api_key".to_string(), "asterisk:secret".to_string())));
    }

    #[test]
    fn events_url_uses_wss_for_https() {
        let base = Url::parse("https://ari.local:8089").unwrap();
        let url = events_url(&base, "demo", "u", "p").unwrap();
        assert_eq!(url.scheme(), "wss");
    }
}
