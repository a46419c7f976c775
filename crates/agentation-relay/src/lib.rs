//! # Agentation Relay
//!
//! The local relay server between annotation clients and the AI bridge.
//!
//! The relay:
//! - Accepts any number of WebSocket connections (one per browser tab)
//! - Tracks the page each connection announced in its `connect` message
//! - Hands every `submit-feedback` to the installed [`FeedbackHandler`] and
//!   routes the `feedback-result` back to the originating connection
//!
//! ## Usage
//!
//! ```ignore
//! use agentation_relay::{RelayConfig, RelayServer};
//!
//! let relay = RelayServer::new(RelayConfig::default());
//! relay.set_feedback_handler(handler);
//! let addr = relay.start().await?;
//! // ...
//! relay.stop().await?;
//! ```

mod connection;
mod dispatch;
mod error;
mod server;
mod state;
mod submission;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use agentation_protocols::{DEFAULT_RELAY_PORT, Envelope, FeedbackHandler, FeedbackResultPayload};

pub use connection::{ConnectionHandle, ConnectionId, WeakConnectionHandle};
pub use error::RelayError;
pub use server::create_router;
pub use state::{ClientRecord, RelayState};
pub use submission::{PLACEHOLDER_RESPONSE, SubmissionSnapshot, SubmissionStatus};

/// Close reason sent to every client on shutdown.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host to bind to (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on (default: 19989, 0 picks a free port).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl RelayConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The relay server.
///
/// Owns its registries; several servers can run side by side.
pub struct RelayServer {
    config: RelayConfig,
    state: Arc<RelayState>,
    running: Mutex<Option<Running>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            state: Arc::new(RelayState::new()),
            running: Mutex::new(None),
        }
    }

    /// Shared state, for components that inspect the registry.
    pub fn state(&self) -> Arc<RelayState> {
        self.state.clone()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Bind and start serving. Returns the bound address.
    ///
    /// Calling `start` on a running server returns its address.
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let address = self.config.address();
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| RelayError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = create_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Relay server error: {}", e);
            }
        });

        self.state.started.store(true, Ordering::SeqCst);
        *self.running.lock() = Some(Running {
            local_addr,
            shutdown_tx,
            handle,
        });

        info!("Relay server listening on ws://{}", local_addr);
        Ok(local_addr)
    }

    /// Bound address, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop accepting connections and close every open one with code 1000.
    pub async fn stop(&self) -> Result<(), RelayError> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        self.state.started.store(false, Ordering::SeqCst);
        let _ = running.shutdown_tx.send(());
        let closed = self.state.close_all(SHUTDOWN_REASON);
        debug!("Relay stopping, closed {} connection(s)", closed);

        match tokio::time::timeout(STOP_TIMEOUT, running.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RelayError::Task(e.to_string())),
            Err(_) => warn!("Relay server did not stop within {:?}", STOP_TIMEOUT),
        }

        info!("Relay server stopped");
        Ok(())
    }

    pub fn set_feedback_handler(&self, handler: Arc<dyn FeedbackHandler>) {
        self.state.set_feedback_handler(handler);
    }

    pub fn clear_feedback_handler(&self) {
        self.state.clear_feedback_handler();
    }

    /// Number of connections that completed `connect`.
    pub fn connection_count(&self) -> usize {
        self.state.connection_count()
    }

    pub fn clients(&self) -> Vec<ClientRecord> {
        self.state.clients()
    }

    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        self.state.broadcast(envelope)
    }

    pub fn pending_submissions(&self) -> Vec<SubmissionSnapshot> {
        self.state.pending_submissions()
    }

    pub fn send_feedback_result(&self, result: FeedbackResultPayload) -> bool {
        self.state.send_feedback_result(result)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
