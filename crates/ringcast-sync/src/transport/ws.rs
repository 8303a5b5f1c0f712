// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport to a remote gateway.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ringcast_core::{ClientFrame, RingcastError, ServerFrame};

use super::{ChannelConnection, EventTransport, not_connected};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

struct WsSession {
    outbound: mpsc::Sender<ClientFrame>,
    cancel: CancellationToken,
}

/// Connects to `ws://host:port/ws`, optionally presenting a connection token.
pub struct WsTransport {
    url: String,
    token: Option<String>,
    queue_capacity: usize,
    session: Mutex<Option<WsSession>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
            queue_capacity: 256,
            session: Mutex::new(None),
        }
    }

    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => format!("{}?token={token}", self.url),
            None => self.url.clone(),
        }
    }
}

#[async_trait]
impl EventTransport for WsTransport {
    async fn connect(&self) -> Result<ChannelConnection, RingcastError> {
        self.disconnect().await;

        let (stream, _) = connect_async(self.endpoint())
            .await
            .map_err(|e| RingcastError::Transport {
                message: format!("failed to connect to {}", self.url),
                source: Some(Box::new(e)),
            })?;
        let (mut sink, mut source) = stream.split();

        // The server greets every connection before anything else.
        let welcome = tokio::time::timeout(HANDSHAKE_TIMEOUT, source.next())
            .await
            .map_err(|_| RingcastError::Timeout {
                duration: HANDSHAKE_TIMEOUT,
            })?;
        let (id, user) = match welcome {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(text.as_str()) {
                Ok(ServerFrame::Welcome {
                    connection_id,
                    user_id,
                }) => (connection_id, user_id),
                Ok(other) => {
                    return Err(RingcastError::Protocol(format!(
                        "expected welcome frame, got {other:?}"
                    )));
                }
                Err(e) => return Err(RingcastError::Protocol(format!("invalid welcome: {e}"))),
            },
            Some(Ok(other)) => {
                return Err(RingcastError::Protocol(format!(
                    "expected welcome frame, got {other:?}"
                )));
            }
            Some(Err(e)) => {
                return Err(RingcastError::Transport {
                    message: "handshake failed".into(),
                    source: Some(Box::new(e)),
                });
            }
            None => return Err(RingcastError::transport("closed during handshake")),
        };

        let cancel = CancellationToken::new();
        let (inbound_tx, inbound) = mpsc::channel(self.queue_capacity);
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientFrame>(self.queue_capacity);

        let reader_cancel = cancel.clone();
        let reader_conn = id.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    msg = source.next() => msg,
                };
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(text.as_str()) {
                            Ok(frame) => {
                                if inbound_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(conn = %reader_conn, "unparseable server frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn = %reader_conn, error = %e, "event channel read failed");
                        break;
                    }
                }
            }
            reader_cancel.cancel();
            debug!(conn = %reader_conn, "reader stopped");
        });

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    frame = outbound_rx.recv() => frame,
                };
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode client frame: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            writer_cancel.cancel();
        });

        *self.session.lock().await = Some(WsSession { outbound, cancel });
        debug!(conn = %id, url = %self.url, "event channel connected");
        Ok(ChannelConnection { id, user, inbound })
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), RingcastError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(not_connected)?;
        if session.cancel.is_cancelled() {
            return Err(not_connected());
        }
        session
            .outbound
            .send(frame)
            .await
            .map_err(|_| RingcastError::transport("connection closed"))
    }

    async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query() {
        let t = WsTransport::new("ws://127.0.0.1:9/ws", Some("u1.abcd".into()));
        assert_eq!(t.endpoint(), "ws://127.0.0.1:9/ws?token=u1.abcd");
        let anon = WsTransport::new("ws://127.0.0.1:9/ws", None);
        assert_eq!(anon.endpoint(), "ws://127.0.0.1:9/ws");
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let t = WsTransport::new("ws://127.0.0.1:9/ws", None);
        assert!(t.send(ClientFrame::Ping).await.is_err());
    }
}
