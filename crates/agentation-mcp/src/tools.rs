//! Read-only tools over the relay registry.

use chrono::SecondsFormat;
use serde_json::{Value, json};

use agentation_relay::{ClientRecord, RelayState};

use crate::protocol::{McpError, McpToolDefinition, McpToolResult};

pub(crate) const GET_PENDING_FEEDBACK: &str = "get-pending-feedback";
pub(crate) const GET_CONNECTION_STATUS: &str = "get-connection-status";

const NO_CLIENTS: &str =
    "No Chrome extension clients connected. Please open the Agentation extension on a web page.";
const WAITING_FOR_FEEDBACK: &str = "Waiting for feedback from extension. Feedback will be processed via MCP sampling when submitted.";

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

pub(crate) fn definitions() -> Vec<McpToolDefinition> {
    vec![
        McpToolDefinition {
            name: GET_PENDING_FEEDBACK.to_string(),
            description: Some(
                "Get pending UI feedback from the Chrome extension. Returns annotations that users have made on web pages."
                    .to_string(),
            ),
            input_schema: empty_schema(),
        },
        McpToolDefinition {
            name: GET_CONNECTION_STATUS.to_string(),
            description: Some(
                "Get the connection status of the Agentation Chrome extension".to_string(),
            ),
            input_schema: empty_schema(),
        },
    ]
}

/// Run a tool by name.
pub(crate) fn call(state: &RelayState, name: &str) -> Result<McpToolResult, McpError> {
    match name {
        GET_PENDING_FEEDBACK => Ok(pending_feedback(state)),
        GET_CONNECTION_STATUS => Ok(connection_status(state)),
        other => Err(McpError::internal_error(format!("Unknown tool: {}", other))),
    }
}

fn client_summary(client: &ClientRecord) -> Value {
    json!({
        "pageUrl": client.page_url,
        "pageTitle": client.page_title,
        "connectedAt": client.connected_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn pending_feedback(state: &RelayState) -> McpToolResult {
    let clients = state.clients();
    if clients.is_empty() {
        return McpToolResult::text(NO_CLIENTS);
    }

    let mut body = json!({
        "connectedClients": clients.iter().map(client_summary).collect::<Vec<_>>(),
        "message": WAITING_FOR_FEEDBACK,
    });
    let submissions = state.pending_submissions();
    if !submissions.is_empty() {
        body["pendingSubmissions"] = json!(submissions);
    }
    McpToolResult::text(pretty(&body))
}

fn connection_status(state: &RelayState) -> McpToolResult {
    let clients = state.clients();
    let status = if clients.is_empty() { "disconnected" } else { "connected" };
    McpToolResult::text(pretty(&json!({
        "status": status,
        "clientCount": clients.len(),
        "clients": clients.iter().map(client_summary).collect::<Vec<_>>(),
    })))
}
