//! Per-connection message dispatch.
//!
//! A connection starts in [`Phase::AwaitingConnect`], becomes
//! [`Phase::Active`] on a well-formed `connect` and ends in
//! [`Phase::Closed`] on `disconnect` or transport close.

use std::sync::Arc;

use tracing::{debug, warn};

use agentation_protocols::{ConnectPayload, Envelope, ErrorCode, MessageKind, NORMAL_CLOSURE};

use crate::connection::ConnectionHandle;
use crate::state::RelayState;
use crate::submission;

/// Lifecycle phase of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    AwaitingConnect,
    Active,
    Closed,
}

const NOT_CONNECTED: &str = "Not connected. Send a connect message first.";

/// Handle one inbound text frame.
pub(crate) fn handle_text(
    state: &Arc<RelayState>,
    conn: &ConnectionHandle,
    phase: &mut Phase,
    text: &str,
) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Invalid message from {}: {}", conn.id(), e);
            conn.send_error(ErrorCode::InvalidMessage, e.to_string());
            return;
        }
    };

    debug!("Received {} from {} ({:?})", envelope.kind, conn.id(), phase);

    let kind = envelope.kind.clone();
    match (*phase, &kind) {
        (Phase::Closed, _) => {}

        (_, MessageKind::Status) => {
            conn.send(Envelope::status(&state.status()));
        }

        (_, MessageKind::Unknown(kind)) => {
            warn!("Unknown message type from {}: {}", conn.id(), kind);
            conn.send_error(
                ErrorCode::InvalidMessage,
                format!("Unknown message type: {}", kind),
            );
        }

        (_, MessageKind::Disconnect) => {
            state.unregister_client(conn.id());
            *phase = Phase::Closed;
            conn.close(NORMAL_CLOSURE, "Client requested disconnect");
        }

        (Phase::AwaitingConnect, MessageKind::Connect) => {
            match envelope.parse_payload::<ConnectPayload>() {
                Ok(payload) => {
                    state.register_client(conn.id(), payload);
                    *phase = Phase::Active;
                    conn.send(Envelope::status(&state.status()));
                }
                Err(e) => {
                    conn.send_error(ErrorCode::InvalidMessage, e.to_string());
                }
            }
        }

        (Phase::AwaitingConnect, _) => {
            conn.send_error(ErrorCode::ConnectionFailed, NOT_CONNECTED);
        }

        (Phase::Active, MessageKind::Connect) => {
            debug!("Repeated connect from {}, keeping original record", conn.id());
            conn.send(Envelope::status(&state.status()));
        }

        (Phase::Active, MessageKind::SubmitFeedback) => {
            if !state.is_registered(conn.id()) {
                conn.send_error(ErrorCode::ConnectionFailed, NOT_CONNECTED);
                return;
            }
            submission::accept(state, conn, envelope);
        }

        (Phase::Active, MessageKind::FeedbackResult | MessageKind::Error) => {
            conn.send_error(
                ErrorCode::InvalidMessage,
                format!("Unexpected message type from client: {}", kind),
            );
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
