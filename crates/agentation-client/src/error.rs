//! Client session errors.

use std::time::Duration;

use thiserror::Error;

use agentation_protocols::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected to relay server")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection to relay server lost")]
    ConnectionLost,

    #[error("Client disconnected")]
    Disconnected,

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// Failure reported by the relay; the message is the server's.
    #[error("{0}")]
    Server(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::SendFailed(err.to_string())
    }
}
