//! Per-connection handler: handshake, then bridge commands and events.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use kagent_common::{Command, Event, PROTOCOL_VERSION};

use crate::session::SessionManager;

type WsStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsSource = futures_util::stream::SplitStream<WsStream>;

/// Handle a single WebSocket connection for its whole lifetime.
pub async fn handle_connection(
    ws: WsStream,
    addr: SocketAddr,
    manager: Arc<SessionManager>,
    hello_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame must be a hello with a version we speak.
    match read_hello(&mut stream, addr, hello_timeout).await {
        Some(PROTOCOL_VERSION) => {}
        Some(version) => {
            tracing::warn!(peer = %addr, version, "Unsupported protocol version");
            let _ = send_event(
                &mut sink,
                &Event::ProtocolError {
                    message: format!("unsupported protocol version {version}"),
                },
            )
            .await;
            return;
        }
        None => return,
    }

    // 2. Open the session and advertise the catalog.
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
    let session = manager.open(event_tx);

    let ready = Event::SessionReady {
        session_id: session.id().clone(),
        version: PROTOCOL_VERSION,
        catalog: manager.catalog(),
    };
    if send_event(&mut sink, &ready).await.is_err() {
        session.close().await;
        return;
    }

    tracing::info!(peer = %addr, session = %session.id(), "Client connected");

    // 3. Bridge loop: session events out, commands in.
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                if send_event(&mut sink, &event).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Command>(&text) {
                            Ok(Command::Call { call_id, tool_name, arguments, .. }) => {
                                session.dispatch(call_id, tool_name, arguments).await;
                            }
                            Ok(Command::Close) => {
                                let _ = send_event(
                                    &mut sink,
                                    &Event::Closed { reason: "client requested close".into() },
                                )
                                .await;
                                break;
                            }
                            Ok(Command::Hello { .. }) => {
                                // Hello after handshake means the peer lost
                                // protocol state; treat as corruption.
                                let _ = send_event(
                                    &mut sink,
                                    &Event::ProtocolError { message: "unexpected hello".into() },
                                )
                                .await;
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "Malformed command");
                                let _ = send_event(
                                    &mut sink,
                                    &Event::ProtocolError { message: format!("malformed command: {e}") },
                                )
                                .await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cancel whatever is still running.
    session.close().await;
    tracing::info!(peer = %addr, session = %session.id(), "Client disconnected");
}

/// Read and parse the first frame as a hello; returns the client's version.
async fn read_hello(
    stream: &mut WsSource,
    addr: SocketAddr,
    hello_timeout: Duration,
) -> Option<u8> {
    let frame = tokio::time::timeout(hello_timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<Command>(&text) {
            Ok(Command::Hello { version }) => Some(version),
            Ok(_) => {
                tracing::warn!(peer = %addr, "First frame was not a hello");
                None
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid hello");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text hello, got binary");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during hello");
            None
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before hello");
            None
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout = ?hello_timeout, "Hello timeout");
            None
        }
    }
}

/// Send an event as a JSON text frame.
async fn send_event(
    sink: &mut WsSink,
    event: &Event,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = serde_json::to_string(event).unwrap();
    sink.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, connect_async};

    use kagent_cluster::ClusterAdapter;
    use kagent_common::{CallError, CallId, CallOutcome, ToolDefinition};
    use kagent_tools::{ToolDescriptor, ToolHandler, ToolRegistry};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn run(&self, arguments: serde_json::Value) -> Result<serde_json::Value, CallError> {
            Ok(arguments)
        }
    }

    fn test_manager() -> Arc<SessionManager> {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::read_only(
                ToolDefinition {
                    name: "echo".into(),
                    description: "echo arguments".into(),
                    parameters: serde_json::json!({"type": "object"}),
                },
                Arc::new(EchoHandler),
            ))
            .unwrap();
        Arc::new(SessionManager::new(
            Arc::new(registry),
            Arc::new(ClusterAdapter::default()),
            Duration::from_secs(5),
        ))
    }

    async fn spawn_server(manager: Arc<SessionManager>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            handle_connection(ws, peer, manager, Duration::from_secs(2)).await;
        });
        format!("ws://{addr}")
    }

    async fn next_event(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Event {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Close(_) => panic!("connection closed while waiting for event"),
                _ => continue,
            }
        }
    }

    async fn send_command(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        command: &Command,
    ) {
        let json = serde_json::to_string(command).unwrap();
        ws.send(Message::Text(json.into())).await.unwrap();
    }

    #[tokio::test]
    async fn handshake_then_call_roundtrip() {
        let url = spawn_server(test_manager()).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send_command(&mut ws, &Command::Hello { version: PROTOCOL_VERSION }).await;
        match next_event(&mut ws).await {
            Event::SessionReady { version, catalog, .. } => {
                assert_eq!(version, PROTOCOL_VERSION);
                assert_eq!(catalog.len(), 1);
                assert_eq!(catalog[0].name, "echo");
            }
            other => panic!("expected session_ready, got {other:?}"),
        }

        send_command(
            &mut ws,
            &Command::Call {
                call_id: CallId::from("c-1"),
                tool_name: "echo".into(),
                arguments: serde_json::json!({"ping": true}),
                issued_at: Utc::now(),
            },
        )
        .await;

        match next_event(&mut ws).await {
            Event::Result { call_id, outcome, .. } => {
                assert_eq!(call_id, CallId::from("c-1"));
                assert_eq!(
                    outcome,
                    CallOutcome::Ok {
                        payload: serde_json::json!({"ping": true})
                    }
                );
            }
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_command_closes_session() {
        let url = spawn_server(test_manager()).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send_command(&mut ws, &Command::Hello { version: PROTOCOL_VERSION }).await;
        let _ready = next_event(&mut ws).await;

        ws.send(Message::Text("{\"type\":\"gibberish\"}".into()))
            .await
            .unwrap();

        match next_event(&mut ws).await {
            Event::ProtocolError { .. } => {}
            other => panic!("expected protocol_error, got {other:?}"),
        }

        // The server side tears the connection down after that.
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    }

    #[tokio::test]
    async fn version_mismatch_rejected() {
        let url = spawn_server(test_manager()).await;
        let (mut ws, _) = connect_async(&url).await.unwrap();

        send_command(&mut ws, &Command::Hello { version: 42 }).await;
        match next_event(&mut ws).await {
            Event::ProtocolError { message } => {
                assert!(message.contains("version"));
            }
            other => panic!("expected protocol_error, got {other:?}"),
        }
    }
}
