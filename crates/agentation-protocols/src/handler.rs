//! Feedback handler capability.
//!
//! The relay server invokes an installed [`FeedbackHandler`] for every
//! `submit-feedback` it accepts and routes the outcome back to the
//! originating connection as a `feedback-result`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::HandlerError;
use crate::payload::SubmitFeedbackPayload;

/// A submission handed to a [`FeedbackHandler`].
#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    /// Correlation id of the submission.
    pub id: String,
    /// Submitted payload, verbatim.
    pub payload: SubmitFeedbackPayload,
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackRequest {
    pub fn new(id: impl Into<String>, payload: SubmitFeedbackPayload) -> Self {
        Self {
            id: id.into(),
            payload,
            submitted_at: Utc::now(),
        }
    }
}

/// Asynchronous capability that turns a submission into response text.
#[async_trait]
pub trait FeedbackHandler: Send + Sync {
    /// Process one submission.
    ///
    /// An `Err` becomes a failed `feedback-result` carrying the error's
    /// display text; it never closes the originating connection.
    async fn handle(&self, request: &FeedbackRequest) -> Result<String, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Annotation;

    struct EchoHandler;

    #[async_trait]
    impl FeedbackHandler for EchoHandler {
        async fn handle(&self, request: &FeedbackRequest) -> Result<String, HandlerError> {
            match request.payload.annotations.first() {
                Some(annotation) => Ok(format!("{}: {}", request.id, annotation.feedback())),
                None => Err(HandlerError::InvalidSubmission("no annotations".to_string())),
            }
        }
    }

    fn payload(annotations: Vec<Annotation>) -> SubmitFeedbackPayload {
        SubmitFeedbackPayload {
            page_url: "http://example.test".to_string(),
            page_title: String::new(),
            annotations,
            additional_context: None,
        }
    }

    #[tokio::test]
    async fn test_handler_as_trait_object() {
        let handler: Box<dyn FeedbackHandler> = Box::new(EchoHandler);
        let request = FeedbackRequest::new(
            "fb_1",
            payload(vec![Annotation::single(1, "#hero", "too small")]),
        );
        assert_eq!(handler.handle(&request).await.unwrap(), "fb_1: too small");
    }

    #[tokio::test]
    async fn test_handler_error_surfaces() {
        let request = FeedbackRequest::new("fb_2", payload(vec![]));
        let err = EchoHandler.handle(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid submission: no annotations");
    }
}
