//! Sampling over the MCP connection.
//!
//! The server sends `sampling/createMessage` to the MCP client and the
//! response comes back on stdin, correlated by a numeric JSON-RPC id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use agentation_protocols::{SamplingCapability, SamplingError, SamplingRequest, SamplingResponse};

use crate::protocol::{McpError, McpMethod, McpRequest, McpResponse, RequestId};
use crate::transport::LineWriter;

type Reply = Result<Value, McpError>;

/// [`SamplingCapability`] backed by the connected MCP client.
pub struct McpSampler {
    writer: LineWriter,
    request_id: AtomicI64,
    pending: Mutex<HashMap<i64, oneshot::Sender<Reply>>>,
    client_supports_sampling: AtomicBool,
    timeout: Duration,
}

impl McpSampler {
    pub fn new(writer: LineWriter, timeout: Duration) -> Self {
        Self {
            writer,
            request_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            client_supports_sampling: AtomicBool::new(false),
            timeout,
        }
    }

    /// Get the next request ID.
    fn next_id(&self) -> i64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Record whether the client declared `sampling` during `initialize`.
    pub fn set_client_sampling(&self, supported: bool) {
        self.client_supports_sampling.store(supported, Ordering::SeqCst);
    }

    pub fn client_supports_sampling(&self) -> bool {
        self.client_supports_sampling.load(Ordering::SeqCst)
    }

    /// Number of sampling requests awaiting the client.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Route a response from the client to its waiting request.
    ///
    /// Returns `false` when no request with that id is outstanding.
    pub fn complete(&self, response: McpResponse) -> bool {
        let RequestId::Number(id) = response.id else {
            return false;
        };
        let Some(tx) = self.pending.lock().remove(&id) else {
            return false;
        };
        let reply = match response.error {
            Some(error) => Err(error),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        let _ = tx.send(reply);
        true
    }

    /// Fail every outstanding request; the client went away.
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            warn!("MCP client gone with {} sampling request(s) outstanding", drained.len());
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(McpError::internal_error("MCP client disconnected")));
        }
    }
}

/// Removes a pending entry when the waiting future is dropped or finishes.
struct PendingEntry<'a> {
    sampler: &'a McpSampler,
    id: i64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.sampler.pending.lock().remove(&self.id);
    }
}

fn map_client_error(error: McpError) -> SamplingError {
    let lowered = error.message.to_lowercase();
    let rejected = error.code == McpError::USER_REJECTED
        || ["reject", "denied", "declined"]
            .iter()
            .any(|word| lowered.contains(word));
    if rejected {
        SamplingError::Denied(error.message)
    } else {
        SamplingError::Failed(error.message)
    }
}

#[async_trait]
impl SamplingCapability for McpSampler {
    async fn create_message(
        &self,
        request: SamplingRequest,
    ) -> Result<SamplingResponse, SamplingError> {
        if !self.is_available() {
            return Err(SamplingError::Unsupported);
        }

        let params = serde_json::to_value(&request)
            .map_err(|e| SamplingError::Failed(format!("Invalid sampling request: {}", e)))?;
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let _entry = PendingEntry { sampler: self, id };

        debug!("Sending {} (id={})", McpMethod::CreateMessage.as_str(), id);
        let message = McpRequest::new(id, McpMethod::CreateMessage.as_str()).with_params(params);
        self.writer
            .send(&message)
            .await
            .map_err(|e| SamplingError::Failed(format!("Failed to reach MCP client: {}", e)))?;

        let reply = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(SamplingError::Failed("MCP client disconnected".to_string())),
            Err(_) => return Err(SamplingError::Timeout(self.timeout)),
        };

        let result = reply.map_err(map_client_error)?;
        serde_json::from_value(result)
            .map_err(|e| SamplingError::Failed(format!("Invalid sampling response: {}", e)))
    }

    fn is_available(&self) -> bool {
        self.client_supports_sampling() && !self.writer.is_closed()
    }
}
