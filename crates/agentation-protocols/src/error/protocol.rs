//! Envelope encoding errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to parse message: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing payload for '{0}' message")]
    MissingPayload(String),

    #[error("Invalid payload for '{kind}' message: {message}")]
    InvalidPayload { kind: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_payload_display() {
        let err = ProtocolError::MissingPayload("connect".to_string());
        assert_eq!(err.to_string(), "Missing payload for 'connect' message");
    }

    #[test]
    fn test_invalid_json_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("Failed to parse message"));
    }
}
