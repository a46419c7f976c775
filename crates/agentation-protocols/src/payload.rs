//! Kind-specific payloads carried by [`Envelope`](crate::Envelope).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::Annotation;
use crate::error::ErrorCode;

/// Payload of `connect`: the page the client is running on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPayload {
    pub page_url: String,
    #[serde(default)]
    pub page_title: String,
}

/// Payload of `submit-feedback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedbackPayload {
    pub page_url: String,
    #[serde(default)]
    pub page_title: String,
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl SubmitFeedbackPayload {
    /// Additional context, treating whitespace-only text as absent.
    pub fn context(&self) -> Option<&str> {
        self.additional_context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Payload of `feedback-result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResultPayload {
    /// Correlation id of the originating `submit-feedback`.
    pub request_id: String,
    pub success: bool,
    /// Failure reason, set when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Handler output, set when `success` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl FeedbackResultPayload {
    pub fn success(request_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            message: None,
            response: Some(response.into()),
        }
    }

    pub fn failure(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            message: Some(message.into()),
            response: None,
        }
    }
}

/// Payload of `status`: registry-wide capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub connected: bool,
    /// Whether a feedback handler (the AI bridge) is installed.
    pub mcp_connected: bool,
    pub sampling_supported: bool,
}

impl StatusPayload {
    /// Status of a live relay, given whether a feedback handler is installed.
    pub fn with_handler(installed: bool) -> Self {
        Self {
            connected: true,
            mcp_connected: installed,
            sampling_supported: installed,
        }
    }
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}
