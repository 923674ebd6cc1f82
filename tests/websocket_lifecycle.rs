// WebSocket lifecycle tests against a local mock server.
//
// The server speaks both plain HTTP (for the API description fetched at
// connect time) and WebSocket (for `/ari/events`), deciding per connection
// by peeking at the request line. Scripts control what each successive
// WebSocket connection does, so reconnect behavior can be exercised.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use asterisk_ari_tokio::constants::{
    EVENT_WEBSOCKET_CONNECTED, EVENT_WEBSOCKET_MAX_RETRIES, EVENT_WEBSOCKET_RECONNECTING,
};
use asterisk_ari_tokio::{AriClient, AriError, ReconnectConfig};

// ── Mock server ─────────────────────────────────────────────────────

fn doc_body(path: &str) -> Option<String> {
    match path {
        "/ari/api-docs/resources.json" => Some(
            json!({
                "apiVersion": "2.0.0",
                "apis": [
                    {"path": "/api-docs/channels.{format}"},
                    {"path": "/api-docs/events.{format}"},
                ]
            })
            .to_string(),
        ),
        "/ari/api-docs/channels.json" => Some(
            json!({
                "apis": [
                    {"path": "/channels", "operations": [
                        {"httpMethod": "GET", "nickname": "list",
                         "responseClass": "List[Channel]", "parameters": []}
                    ]}
                ],
                "models": {}
            })
            .to_string(),
        ),
        "/ari/api-docs/events.json" => Some(
            json!({
                "apis": [],
                "models": {
                    "ChannelDtmfReceived": {"id": "ChannelDtmfReceived", "properties": {
                        "digit": {"type": "string"},
                        "channel": {"type": "Channel"}
                    }}
                }
            })
            .to_string(),
        ),
        _ => None,
    }
}

async fn handle_http(mut stream: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf
            .windows(4)
            .any(|w| w == b"\r\n\r\n")
        {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf);
    let path = request
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    let (status, body) = match doc_body(&path) {
        Some(body) => ("200 OK", body),
        None => ("404 Not Found", String::from("{}")),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream
        .write_all(response.as_bytes())
        .await;
    let _ = stream
        .shutdown()
        .await;
}

/// What the server does with each successive WebSocket connection.
enum WsScript {
    /// Deliver one event frame, then close the socket.
    SendFrameThenClose(String),
    /// Keep the socket open until the client goes away.
    StayOpen,
}

async fn handle_ws(stream: TcpStream, script: WsScript) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    match script {
        WsScript::SendFrameThenClose(frame) => {
            let _ = ws
                .send(Message::Text(frame))
                .await;
            // Let the client read the frame before the close lands.
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = ws
                .close(None)
                .await;
            while let Some(msg) = ws.next().await {
                if msg.is_err() {
                    break;
                }
            }
        }
        WsScript::StayOpen => {
            while let Some(msg) = ws.next().await {
                if msg.is_err() {
                    break;
                }
            }
        }
    }
}

/// Accept loop: HTTP requests are answered inline, WebSocket upgrades are
/// handed their next script. Counts WebSocket accepts.
async fn run_server(listener: TcpListener, scripts: Vec<WsScript>, ws_accepts: Arc<AtomicUsize>) {
    let mut scripts = scripts.into_iter();
    loop {
        let Ok((stream, _)) = listener
            .accept()
            .await
        else {
            return;
        };
        let mut buf = [0u8; 1024];
        let Ok(n) = stream
            .peek(&mut buf)
            .await
        else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..n]).to_string();
        if head.starts_with("GET /ari/events") {
            ws_accepts.fetch_add(1, Ordering::SeqCst);
            let script = scripts
                .next()
                .unwrap_or(WsScript::StayOpen);
            tokio::spawn(handle_ws(stream, script));
        } else {
            handle_http(stream).await;
        }
    }
}

/// Serve the schema, accept exactly one WebSocket, close it, then die so
/// every reconnect attempt is refused.
async fn run_server_die_after_first_ws(listener: TcpListener) {
    loop {
        let Ok((stream, _)) = listener
            .accept()
            .await
        else {
            return;
        };
        let mut buf = [0u8; 1024];
        let Ok(n) = stream
            .peek(&mut buf)
            .await
        else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..n]).to_string();
        if head.starts_with("GET /ari/events") {
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws
                    .close(None)
                    .await;
            }
            return;
        }
        handle_http(stream).await;
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

fn counter(client: &AriClient, event: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = count.clone();
    client.on(event, move |_, _| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    count
}

fn dtmf_frame() -> String {
    json!({
        "type": "ChannelDtmfReceived",
        "application": "test-app",
        "digit": "4",
        "channel": {"id": "chan-ws", "state": "Up"}
    })
    .to_string()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn reconnects_after_server_close_and_stops_on_request() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    let ws_accepts = Arc::new(AtomicUsize::new(0));
    tokio::spawn(run_server(
        listener,
        vec![
            WsScript::SendFrameThenClose(dtmf_frame()),
            WsScript::StayOpen,
        ],
        ws_accepts.clone(),
    ));

    let config = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        max_retries: 5,
    };
    let client = AriClient::connect_with_config(&format!("http://{}", addr), "u", "p", config)
        .await
        .unwrap();

    let connected = counter(&client, EVENT_WEBSOCKET_CONNECTED);
    let reconnecting = counter(&client, EVENT_WEBSOCKET_RECONNECTING);
    let dtmf = counter(&client, "ChannelDtmfReceived");

    client
        .start(["test-app"])
        .await
        .unwrap();
    assert!(client.is_started());
    assert_eq!(connected.load(Ordering::SeqCst), 1);

    // The frame sent on the first connection arrives end-to-end.
    wait_until(|| dtmf.load(Ordering::SeqCst) >= 1).await;

    // The server closed; the client reconnects and announces both phases.
    wait_until(|| connected.load(Ordering::SeqCst) >= 2).await;
    assert!(reconnecting.load(Ordering::SeqCst) >= 1);
    assert_eq!(ws_accepts.load(Ordering::SeqCst), 2);

    // stop() is idempotent and inhibits any further reconnection.
    client.stop();
    client.stop();
    assert!(!client.is_started());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        ws_accepts.load(Ordering::SeqCst),
        2,
        "no reconnect may happen after stop()"
    );
}

#[tokio::test]
async fn exhausted_retry_budget_emits_max_retries() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    tokio::spawn(run_server_die_after_first_ws(listener));

    let config = ReconnectConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        max_retries: 3,
    };
    let client = AriClient::connect_with_config(&format!("http://{}", addr), "u", "p", config)
        .await
        .unwrap();

    let reconnecting = counter(&client, EVENT_WEBSOCKET_RECONNECTING);
    let max_retries = counter(&client, EVENT_WEBSOCKET_MAX_RETRIES);

    client
        .start(["test-app"])
        .await
        .unwrap();

    wait_until(|| max_retries.load(Ordering::SeqCst) >= 1).await;
    assert!(reconnecting.load(Ordering::SeqCst) >= 1);

    // The loop has shut itself down; the client may be started again, and
    // with the server gone the fresh attempt fails inline.
    wait_until(|| !client.is_started()).await;
    let err = client
        .start(["test-app"])
        .await
        .unwrap_err();
    assert!(matches!(err, AriError::WebSocket { .. }), "got: {:?}", err);
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    let ws_accepts = Arc::new(AtomicUsize::new(0));
    tokio::spawn(run_server(listener, vec![WsScript::StayOpen], ws_accepts.clone()));

    let client = AriClient::connect(&format!("http://{}", addr), "u", "p")
        .await
        .unwrap();

    client
        .start(["test-app"])
        .await
        .unwrap();
    let err = client
        .start(["test-app"])
        .await
        .unwrap_err();
    assert!(matches!(err, AriError::WebSocket { .. }));

    client.stop();
}
