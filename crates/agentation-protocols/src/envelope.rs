//! Message envelope exchanged on the relay WebSocket.
//!
//! Every frame is a single JSON object:
//!
//! ```json
//! {"type": "submit-feedback", "id": "fb_1718000000000_k3j9x0a", "payload": {...}, "timestamp": "..."}
//! ```
//!
//! `type` selects the payload shape, `id` correlates a request with its
//! reply and `timestamp` is informational only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, ProtocolError};
use crate::payload::{
    ConnectPayload, ErrorPayload, FeedbackResultPayload, StatusPayload, SubmitFeedbackPayload,
};

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

/// Message kind carried in the `type` field.
///
/// Kinds this build does not know are preserved in [`MessageKind::Unknown`]
/// so receivers can log and ignore them instead of dropping the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Connect,
    Disconnect,
    SubmitFeedback,
    FeedbackResult,
    Status,
    Error,
    Unknown(String),
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Connect => "connect",
            MessageKind::Disconnect => "disconnect",
            MessageKind::SubmitFeedback => "submit-feedback",
            MessageKind::FeedbackResult => "feedback-result",
            MessageKind::Status => "status",
            MessageKind::Error => "error",
            MessageKind::Unknown(other) => other,
        }
    }

    /// Whether this is one of the closed set of known kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, MessageKind::Unknown(_))
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "connect" => MessageKind::Connect,
            "disconnect" => MessageKind::Disconnect,
            "submit-feedback" => MessageKind::SubmitFeedback,
            "feedback-result" => MessageKind::FeedbackResult,
            "status" => MessageKind::Status,
            "error" => MessageKind::Error,
            _ => MessageKind::Unknown(value),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Unknown(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a correlation id of the form `fb_<unix millis>_<7 random chars>`.
///
/// Unique within a process with overwhelming probability; not a secret.
pub fn new_request_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("fb_{}_{}", Utc::now().timestamp_millis(), &suffix[..7])
}

/// A single message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Correlation id, present on requests expecting a reply and on the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Send time. Not used for ordering.
    ///
    /// RFC 3339 strings and Unix milliseconds are accepted; anything else is
    /// replaced by the receive time instead of failing the message.
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Value::deserialize(deserializer)? {
        Value::String(text) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(Utc::now))
}

impl Envelope {
    /// Create an envelope with no id and no payload.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            id: None,
            payload: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a correlation id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a payload.
    ///
    /// A value that cannot be represented as JSON (a map with non-string
    /// keys, for instance) leaves the envelope without a payload, which the
    /// receiver reports as a missing payload.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).ok();
        self
    }

    /// `connect` announcement with page metadata.
    pub fn connect(payload: &ConnectPayload) -> Self {
        Self::new(MessageKind::Connect).with_payload(payload)
    }

    /// `disconnect` request.
    pub fn disconnect() -> Self {
        Self::new(MessageKind::Disconnect)
    }

    /// `status` request (client) or reply (server, see [`Envelope::status`]).
    pub fn status_request() -> Self {
        Self::new(MessageKind::Status)
    }

    /// `status` reply.
    pub fn status(payload: &StatusPayload) -> Self {
        Self::new(MessageKind::Status).with_payload(payload)
    }

    /// `submit-feedback` request correlated by `id`.
    pub fn submit_feedback(id: impl Into<String>, payload: &SubmitFeedbackPayload) -> Self {
        Self::new(MessageKind::SubmitFeedback)
            .with_id(id)
            .with_payload(payload)
    }

    /// `feedback-result` reply, correlated by the payload's request id.
    pub fn feedback_result(payload: &FeedbackResultPayload) -> Self {
        Self::new(MessageKind::FeedbackResult)
            .with_id(payload.request_id.clone())
            .with_payload(payload)
    }

    /// `error` reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(MessageKind::Error).with_payload(&ErrorPayload::new(code, message))
    }

    /// Decode an envelope from a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode the envelope as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize the payload into the shape expected for this kind.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let payload = self
            .payload
            .clone()
            .ok_or_else(|| ProtocolError::MissingPayload(self.kind.to_string()))?;

        serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
            kind: self.kind.to_string(),
            message: e.to_string(),
        })
    }
}
