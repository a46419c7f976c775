//! WebSocket connection management.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use agentation_protocols::{Envelope, ErrorCode};

use crate::dispatch::{self, Phase};
use crate::state::RelayState;

/// Unique id of a transport connection.
pub type ConnectionId = String;

/// Frame queued for a connection's writer.
#[derive(Debug)]
pub(crate) enum Outbound {
    Envelope(Envelope),
    Close { code: u16, reason: String },
}

/// Sending half of an open connection.
///
/// Sends never block and never fail loudly: once the connection task has
/// exited they return `false`.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: ConnectionId, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue an envelope.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.tx.send(Outbound::Envelope(envelope)).is_ok()
    }

    /// Queue an `error` envelope.
    pub fn send_error(&self, code: ErrorCode, message: impl Into<String>) -> bool {
        self.send(Envelope::error(code, message))
    }

    /// Queue a close frame. Frames queued earlier are written first.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        self.tx
            .send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Reference that does not keep the connection's queue alive.
    pub fn downgrade(&self) -> WeakConnectionHandle {
        WeakConnectionHandle {
            id: self.id.clone(),
            tx: self.tx.downgrade(),
        }
    }
}

/// Weak reference to a connection held by in-flight submissions.
#[derive(Debug, Clone)]
pub struct WeakConnectionHandle {
    id: ConnectionId,
    tx: mpsc::WeakUnboundedSender<Outbound>,
}

impl WeakConnectionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The connection, if it is still open.
    pub fn upgrade(&self) -> Option<ConnectionHandle> {
        let tx = self.tx.upgrade()?;
        if tx.is_closed() {
            return None;
        }
        Some(ConnectionHandle {
            id: self.id.clone(),
            tx,
        })
    }
}

/// Drive one WebSocket connection until it closes.
pub(crate) async fn run_connection(socket: WebSocket, state: Arc<RelayState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut outbound_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(conn_id.clone(), tx);
    state.track_transport(handle.clone());

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut phase = Phase::AwaitingConnect;

    debug!("WebSocket connection opened: {}", conn_id);

    loop {
        tokio::select! {
            Some(outbound) = outbound_rx.recv() => {
                match outbound {
                    Outbound::Envelope(envelope) => {
                        let text = match envelope.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode {} for {}: {}", envelope.kind, conn_id, e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                            warn!("Failed to send message to {}: {}", conn_id, e);
                            break;
                        }
                    }
                    Outbound::Close { code, reason } => {
                        debug!("Closing {} with {} ({})", conn_id, code, reason);
                        let frame = CloseFrame { code, reason: reason.into() };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        let _ = ws_tx.flush().await;
                        break;
                    }
                }
            }

            result = ws_rx.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        dispatch::handle_text(&state, &handle, &mut phase, text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        handle.send_error(ErrorCode::InvalidMessage, "Binary frames are not supported");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Received close from {}: {:?}", conn_id, frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket error from {}: {}", conn_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(record) = state.forget_connection(&conn_id) {
        info!("Client disconnected: {} ({})", record.page_url, conn_id);
    } else {
        debug!("WebSocket connection closed: {}", conn_id);
    }
}
