//! Wire-level error codes carried in `error` payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error code of an `error` message.
///
/// `SamplingDenied` and `SamplingTimeout` are reserved for AI-capability
/// failures; they currently travel as the prefix of a failed
/// `feedback-result` message rather than as standalone errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// Malformed or unrecognized message.
    InvalidMessage,
    /// The action requires an established connection that is absent.
    ConnectionFailed,
    /// Unexpected internal fault.
    ServerError,
    SamplingDenied,
    SamplingTimeout,
    /// A code this build does not know.
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::SamplingDenied => "SAMPLING_DENIED",
            ErrorCode::SamplingTimeout => "SAMPLING_TIMEOUT",
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "INVALID_MESSAGE" => ErrorCode::InvalidMessage,
            "CONNECTION_FAILED" => ErrorCode::ConnectionFailed,
            "SERVER_ERROR" => ErrorCode::ServerError,
            "SAMPLING_DENIED" => ErrorCode::SamplingDenied,
            "SAMPLING_TIMEOUT" => ErrorCode::SamplingTimeout,
            _ => ErrorCode::Other(value),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Other(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
