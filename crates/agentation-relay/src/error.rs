//! Relay server errors.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Relay server task failed: {0}")]
    Task(String),
}
