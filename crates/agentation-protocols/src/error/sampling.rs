//! AI sampling errors.

use std::time::Duration;

use thiserror::Error;

/// Failure of the AI sampling capability.
///
/// Denied and timed-out requests render with the reserved wire codes so the
/// failure message of a `feedback-result` identifies them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SamplingError {
    /// The assistant host or its user refused the request.
    #[error("SAMPLING_DENIED: {0}")]
    Denied(String),

    /// No completion arrived in time.
    #[error("SAMPLING_TIMEOUT: no response after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The connected assistant host does not offer sampling.
    #[error("SAMPLING_DENIED: connected MCP client does not support sampling")]
    Unsupported,

    /// Any other failure; the message is passed through verbatim.
    #[error("{0}")]
    Failed(String),
}
