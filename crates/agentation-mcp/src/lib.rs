//! MCP (Model Context Protocol) stdio server for Agentation.
//!
//! Speaks line-delimited JSON-RPC 2.0 with the MCP client that launched the
//! process. Exposes read-only relay tools and turns the client's `sampling`
//! capability into a [`SamplingCapability`](agentation_protocols::SamplingCapability).

mod protocol;
mod sampler;
mod server;
mod tools;
mod transport;

pub use protocol::{
    McpContent, McpError, McpMessage, McpMethod, McpNotification, McpRequest, McpResponse,
    McpToolDefinition, McpToolResult, PROTOCOL_VERSION, RequestId,
};
pub use sampler::McpSampler;
pub use server::McpServer;
pub use transport::{LineWriter, TransportError};
