//! MCP server loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, info, warn};

use agentation_relay::RelayState;

use crate::protocol::{
    McpError, McpMessage, McpMethod, McpNotification, McpRequest, McpResponse, PROTOCOL_VERSION,
};
use crate::sampler::McpSampler;
use crate::tools;
use crate::transport::{LineWriter, TransportError, read_line};

const SERVER_NAME: &str = "agentation";

/// MCP server bound to one client over a line-delimited byte stream.
pub struct McpServer {
    state: Arc<RelayState>,
    writer: LineWriter,
    sampler: Arc<McpSampler>,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(state: Arc<RelayState>, writer: LineWriter, sampling_timeout: Duration) -> Self {
        let sampler = Arc::new(McpSampler::new(writer.clone(), sampling_timeout));
        Self {
            state,
            writer,
            sampler,
            initialized: AtomicBool::new(false),
        }
    }

    /// Sampling capability backed by this server's client.
    pub fn sampler(&self) -> Arc<McpSampler> {
        self.sampler.clone()
    }

    /// Whether the client completed the `initialize` handshake.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Serve until the input reaches end of file.
    ///
    /// Outstanding sampling requests fail once the loop ends.
    pub async fn run<R>(&self, reader: R) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let result = loop {
            match read_line(&mut reader).await {
                Ok(Some(line)) => {
                    if let Err(e) = self.handle_line(&line).await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    info!("MCP client closed the connection");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.writer.close();
        self.sampler.fail_all();
        result
    }

    async fn handle_line(&self, line: &str) -> Result<(), TransportError> {
        match McpMessage::parse(line) {
            Ok(McpMessage::Request(request)) => {
                let id = request.id.clone();
                let response = match self.handle_request(request) {
                    Ok(result) => McpResponse::success(id, result),
                    Err(error) => McpResponse::error(id, error),
                };
                self.writer.send(&response).await
            }
            Ok(McpMessage::Notification(notification)) => {
                self.handle_notification(notification);
                Ok(())
            }
            Ok(McpMessage::Response(response)) => {
                if !self.sampler.complete(response) {
                    debug!("Dropping response without a matching request");
                }
                Ok(())
            }
            Err(error) => {
                warn!("Unreadable MCP message: {}", error.message);
                let reply = json!({"jsonrpc": "2.0", "id": Value::Null, "error": error});
                self.writer.send(&reply).await
            }
        }
    }

    fn handle_request(&self, request: McpRequest) -> Result<Value, McpError> {
        debug!("MCP request: {} (id={:?})", request.method, request.id);
        match McpMethod::from_name(&request.method) {
            Some(McpMethod::Initialize) => Ok(self.initialize(request.params.as_ref())),
            Some(McpMethod::Ping) => Ok(json!({})),
            Some(McpMethod::ListTools) => Ok(json!({"tools": tools::definitions()})),
            Some(McpMethod::CallTool) => {
                let name = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| McpError::invalid_params("Missing tool name"))?;
                let result = tools::call(&self.state, name)?;
                serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
            }
            _ => Err(McpError::method_not_found()),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let sampling = params
            .and_then(|p| p.pointer("/capabilities/sampling"))
            .is_some_and(|s| !s.is_null());
        self.sampler.set_client_sampling(sampling);

        let client = params
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!("MCP client '{}' connected (sampling: {})", client, sampling);

        let version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);

        json!({
            "protocolVersion": version,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn handle_notification(&self, notification: McpNotification) {
        match McpMethod::from_name(&notification.method) {
            Some(McpMethod::Initialized) => {
                self.initialized.store(true, Ordering::SeqCst);
                info!("MCP session initialized");
            }
            _ => debug!("Ignoring notification {}", notification.method),
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
