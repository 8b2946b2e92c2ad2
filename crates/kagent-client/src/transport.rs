//! WebSocket transport client.
//!
//! Sends call commands, correlates result events back to their callers by
//! `call_id`, and fails every pending call with `TransportClosed` when the
//! connection drops. The conversation itself is never sent to the server;
//! history is entirely client-owned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use kagent_common::{CallId, CallOutcome, Command, Event, SessionId, ToolDefinition, PROTOCOL_VERSION};

use crate::conversation::ToolCallRequest;
use crate::AgentError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatch surface the orchestration loop runs against; mocked in tests.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// The server's advertised tool catalog, in the server's stable order.
    fn catalog(&self) -> &[ToolDefinition];

    /// Issue one call and wait for its result. Tool failures come back as
    /// an error outcome, not an `Err`; only transport loss is an `Err`.
    async fn call(&self, request: ToolCallRequest) -> Result<CallOutcome, AgentError>;
}

type PendingMap = Arc<Mutex<HashMap<CallId, oneshot::Sender<CallOutcome>>>>;

pub struct WsTransport {
    session_id: SessionId,
    catalog: Vec<ToolDefinition>,
    cmd_tx: mpsc::Sender<Command>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
}

impl WsTransport {
    /// Connect, perform the hello handshake, and spawn the reader/writer
    /// tasks. Returns once the server's catalog is in hand.
    pub async fn connect(url: &str) -> Result<Self, AgentError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| AgentError::Handshake(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let hello = serde_json::to_string(&Command::Hello {
            version: PROTOCOL_VERSION,
        })
        .unwrap();
        sink.send(Message::Text(hello.into()))
            .await
            .map_err(|e| AgentError::Handshake(format!("failed to send hello: {e}")))?;

        let ready = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_event(&mut stream))
            .await
            .map_err(|_| AgentError::Handshake("timed out waiting for session_ready".into()))?;

        let (session_id, catalog) = match ready {
            Some(Event::SessionReady {
                session_id,
                version: PROTOCOL_VERSION,
                catalog,
            }) => (session_id, catalog),
            Some(Event::SessionReady { version, .. }) => {
                return Err(AgentError::Handshake(format!(
                    "server speaks protocol version {version}"
                )));
            }
            Some(Event::ProtocolError { message }) => {
                return Err(AgentError::Handshake(message));
            }
            other => {
                return Err(AgentError::Handshake(format!(
                    "unexpected handshake reply: {other:?}"
                )));
            }
        };

        tracing::info!(session = %session_id, tools = catalog.len(), "Session ready");

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(64);

        // Writer: serialize commands onto the socket.
        tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                let json = serde_json::to_string(&command).unwrap();
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: correlate results, then fail whatever is left on exit.
        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Event>(&text) {
                        Ok(Event::Result {
                            call_id, outcome, ..
                        }) => {
                            let sender = reader_pending.lock().await.remove(&call_id);
                            match sender {
                                Some(tx) => {
                                    let _ = tx.send(outcome);
                                }
                                None => {
                                    tracing::debug!(call = %call_id, "Result for unknown call");
                                }
                            }
                        }
                        Ok(Event::Closed { reason }) => {
                            tracing::info!(reason = %reason, "Server closed session");
                            break;
                        }
                        Ok(Event::ProtocolError { message }) => {
                            tracing::warn!(message = %message, "Protocol error from server");
                            break;
                        }
                        Ok(Event::SessionReady { .. }) => {}
                        Err(e) => {
                            tracing::debug!(error = %e, "Unrecognized event");
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Mark closed and drop pending senders under the same lock that
            // call() inserts through, so no call can slip in afterwards and
            // hang. Dropped senders surface as TransportClosed.
            let mut pending = reader_pending.lock().await;
            reader_closed.store(true, Ordering::SeqCst);
            pending.clear();
        });

        Ok(Self {
            session_id,
            catalog,
            cmd_tx,
            pending,
            closed,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Orderly shutdown; the server cancels anything still in flight.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }
}

#[async_trait]
impl ToolTransport for WsTransport {
    fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    async fn call(&self, request: ToolCallRequest) -> Result<CallOutcome, AgentError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(AgentError::TransportClosed);
            }
            pending.insert(request.call_id.clone(), tx);
        }

        let command = Command::Call {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name,
            arguments: request.arguments,
            issued_at: Utc::now(),
        };
        if self.cmd_tx.send(command).await.is_err() {
            self.pending.lock().await.remove(&request.call_id);
            return Err(AgentError::TransportClosed);
        }

        rx.await.map_err(|_| AgentError::TransportClosed)
    }
}

async fn read_event(
    stream: &mut futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
) -> Option<Event> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => continue,
        }
    }
    None
}
