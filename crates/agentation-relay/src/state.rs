//! Connection and submission registries owned by one relay instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use agentation_protocols::{
    ConnectPayload, Envelope, FeedbackHandler, FeedbackResultPayload, NORMAL_CLOSURE,
    StatusPayload,
};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::submission::{SubmissionRecord, SubmissionSnapshot};

/// Metadata of a connection that has announced itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub connection_id: ConnectionId,
    pub page_url: String,
    pub page_title: String,
    pub connected_at: DateTime<Utc>,
}

/// State shared by the router, every connection task and the hosting process.
pub struct RelayState {
    /// Every open transport, announced or not.
    transports: DashMap<ConnectionId, ConnectionHandle>,
    /// Connections that completed `connect`.
    clients: DashMap<ConnectionId, ClientRecord>,
    /// In-flight submissions keyed by correlation id.
    pub(crate) submissions: DashMap<String, SubmissionRecord>,
    handler: RwLock<Option<Arc<dyn FeedbackHandler>>>,
    pub(crate) started: AtomicBool,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            transports: DashMap::new(),
            clients: DashMap::new(),
            submissions: DashMap::new(),
            handler: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Install the handler invoked for every accepted submission.
    pub fn set_feedback_handler(&self, handler: Arc<dyn FeedbackHandler>) {
        *self.handler.write() = Some(handler);
        info!("Feedback handler installed");
    }

    /// Remove the handler. Later submissions get the placeholder acknowledgement.
    pub fn clear_feedback_handler(&self) {
        if self.handler.write().take().is_some() {
            info!("Feedback handler removed");
        }
    }

    pub fn handler(&self) -> Option<Arc<dyn FeedbackHandler>> {
        self.handler.read().clone()
    }

    pub fn handler_installed(&self) -> bool {
        self.handler.read().is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Registry-wide capability status.
    pub fn status(&self) -> StatusPayload {
        StatusPayload::with_handler(self.handler_installed())
    }

    /// Number of announced connections.
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of open transports, including ones still awaiting `connect`.
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Snapshot of announced connections, oldest first.
    pub fn clients(&self) -> Vec<ClientRecord> {
        let mut clients: Vec<ClientRecord> =
            self.clients.iter().map(|entry| entry.value().clone()).collect();
        clients.sort_by_key(|c| c.connected_at);
        clients
    }

    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.clients.contains_key(connection_id)
    }

    /// Snapshot of in-flight submissions, oldest first.
    pub fn pending_submissions(&self) -> Vec<SubmissionSnapshot> {
        let mut pending: Vec<SubmissionSnapshot> = self
            .submissions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        pending.sort_by_key(|s| s.created_at);
        pending
    }

    /// Send an envelope to every announced connection. Returns how many accepted it.
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        self.clients
            .iter()
            .filter_map(|entry| self.transports.get(entry.key()).map(|t| t.value().clone()))
            .filter(|handle| handle.send(envelope.clone()))
            .count()
    }

    /// Complete an in-flight submission with an externally produced result.
    ///
    /// Returns `false` if the submission is unknown or its connection is gone.
    pub fn send_feedback_result(&self, result: FeedbackResultPayload) -> bool {
        let outcome = if result.success {
            Ok(result.response.unwrap_or_default())
        } else {
            Err(result.message.unwrap_or_default())
        };
        self.finish_submission(&result.request_id, outcome)
    }

    pub(crate) fn track_transport(&self, handle: ConnectionHandle) {
        self.transports.insert(handle.id().to_string(), handle);
    }

    /// Register an announced connection. The first record wins.
    pub(crate) fn register_client(&self, connection_id: &str, payload: ConnectPayload) -> bool {
        if self.clients.contains_key(connection_id) {
            return false;
        }
        info!("Client connected: {} ({})", payload.page_url, connection_id);
        self.clients.insert(
            connection_id.to_string(),
            ClientRecord {
                connection_id: connection_id.to_string(),
                page_url: payload.page_url,
                page_title: payload.page_title,
                connected_at: Utc::now(),
            },
        );
        true
    }

    pub(crate) fn unregister_client(&self, connection_id: &str) -> Option<ClientRecord> {
        self.clients.remove(connection_id).map(|(_, record)| record)
    }

    /// Drop every trace of a closed transport.
    pub(crate) fn forget_connection(&self, connection_id: &str) -> Option<ClientRecord> {
        self.transports.remove(connection_id);
        self.unregister_client(connection_id)
    }

    /// Close every open transport with the normal-closure code and clear the registry.
    pub(crate) fn close_all(&self, reason: &str) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .transports
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for handle in &handles {
            handle.close(NORMAL_CLOSURE, reason);
        }
        self.transports.clear();
        self.clients.clear();
        debug!("Closed {} connection(s)", handles.len());
        handles.len()
    }
}
