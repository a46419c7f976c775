//! Feedback submission lifecycle.
//!
//! Each accepted `submit-feedback` becomes a [`SubmissionRecord`] that moves
//! `pending -> processing -> completed | failed` and is removed from the
//! registry as soon as its `feedback-result` has been routed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use agentation_protocols::{
    Envelope, ErrorCode, FeedbackRequest, FeedbackResultPayload, SubmitFeedbackPayload,
    new_request_id,
};

use crate::connection::{ConnectionHandle, WeakConnectionHandle};
use crate::state::RelayState;

/// Acknowledgement sent when no feedback handler is installed.
pub const PLACEHOLDER_RESPONSE: &str =
    "Feedback received. Waiting for MCP client to process via sampling.";

/// Submission status. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }
}

/// A submission in flight.
#[derive(Debug)]
pub(crate) struct SubmissionRecord {
    id: String,
    connection: WeakConnectionHandle,
    payload: SubmitFeedbackPayload,
    status: SubmissionStatus,
    response: Option<String>,
    created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    fn new(id: String, connection: WeakConnectionHandle, payload: SubmitFeedbackPayload) -> Self {
        Self {
            id,
            connection,
            payload,
            status: SubmissionStatus::Pending,
            response: None,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`; illegal transitions are ignored and reported as `false`.
    fn advance(&mut self, next: SubmissionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                "Ignoring submission {} transition {:?} -> {:?}",
                self.id, self.status, next
            );
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn snapshot(&self) -> SubmissionSnapshot {
        SubmissionSnapshot {
            id: self.id.clone(),
            connection_id: self.connection.id().to_string(),
            page_url: self.payload.page_url.clone(),
            annotation_count: self.payload.annotations.len(),
            status: self.status,
            response: self.response.clone(),
            created_at: self.created_at,
        }
    }
}

/// Read-only view of an in-flight submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSnapshot {
    pub id: String,
    pub connection_id: String,
    pub page_url: String,
    pub annotation_count: usize,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Accept a `submit-feedback` from a registered connection.
pub(crate) fn accept(state: &Arc<RelayState>, conn: &ConnectionHandle, envelope: Envelope) {
    let payload = match envelope.parse_payload::<SubmitFeedbackPayload>() {
        Ok(payload) => payload,
        Err(e) => {
            let mut reply = Envelope::error(ErrorCode::InvalidMessage, e.to_string());
            reply.id = envelope.id;
            conn.send(reply);
            return;
        }
    };

    let id = envelope
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_request_id);

    match state.submissions.entry(id.clone()) {
        Entry::Occupied(_) => {
            warn!("Duplicate submission id {} from {}", id, conn.id());
            conn.send_error(
                ErrorCode::InvalidMessage,
                format!("Submission {} is already pending", id),
            );
            return;
        }
        Entry::Vacant(slot) => {
            info!(
                "Feedback {} received from {} ({} annotation(s))",
                id,
                conn.id(),
                payload.annotations.len()
            );
            slot.insert(SubmissionRecord::new(id.clone(), conn.downgrade(), payload));
        }
    }

    tokio::spawn(process(state.clone(), id));
}

/// Run the installed handler for one submission and route its outcome.
async fn process(state: Arc<RelayState>, id: String) {
    let request = {
        let Some(mut record) = state.submissions.get_mut(&id) else {
            return;
        };
        if !record.advance(SubmissionStatus::Processing) {
            return;
        }
        FeedbackRequest {
            id: id.clone(),
            payload: record.payload.clone(),
            submitted_at: record.created_at,
        }
    };

    let outcome = match state.handler() {
        None => {
            debug!("No feedback handler installed, acknowledging {}", id);
            Ok(PLACEHOLDER_RESPONSE.to_string())
        }
        Some(handler) => {
            let task = tokio::spawn(async move { handler.handle(&request).await });
            match task.await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => {
                    warn!("Feedback handler failed for {}: {}", id, e);
                    Err(e.to_string())
                }
                Err(join_error) => {
                    error!("Feedback handler aborted for {}: {}", id, join_error);
                    let cause = if join_error.is_panic() { "panicked" } else { "was cancelled" };
                    Err(format!("{}: feedback handler {}", ErrorCode::ServerError, cause))
                }
            }
        }
    };

    state.finish_submission(&id, outcome);
}

impl RelayState {
    /// Record the outcome, drop the submission and deliver its result.
    ///
    /// Delivery to a connection that has gone away is a silent no-op.
    pub(crate) fn finish_submission(&self, id: &str, outcome: Result<String, String>) -> bool {
        let Some((_, mut record)) = self.submissions.remove(id) else {
            debug!("Submission {} already finished", id);
            return false;
        };
        if record.status == SubmissionStatus::Pending {
            record.advance(SubmissionStatus::Processing);
        }

        let result = match outcome {
            Ok(response) => {
                record.advance(SubmissionStatus::Completed);
                record.response = Some(response.clone());
                FeedbackResultPayload::success(id, response)
            }
            Err(message) => {
                record.advance(SubmissionStatus::Failed);
                FeedbackResultPayload::failure(id, message)
            }
        };
        debug_assert!(record.status.is_terminal());

        let delivered = record
            .connection
            .upgrade()
            .is_some_and(|conn| conn.send(Envelope::feedback_result(&result)));
        if delivered {
            debug!("Feedback result {} routed to {}", id, record.connection.id());
        } else {
            debug!("Connection {} gone, dropping result {}", record.connection.id(), id);
        }
        delivered
    }
}

#[cfg(test)]
#[path = "submission_tests.rs"]
mod tests;
