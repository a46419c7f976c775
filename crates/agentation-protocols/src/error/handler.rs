//! Feedback handler errors.

use thiserror::Error;

use super::SamplingError;

/// Failure of a [`FeedbackHandler`](crate::FeedbackHandler).
///
/// The `Display` text becomes the `message` of the failed `feedback-result`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}
