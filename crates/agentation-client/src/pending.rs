//! Pending-request table.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::ClientError;

pub(crate) type RequestOutcome = Result<String, ClientError>;

/// A `submit-feedback` waiting for its result.
pub(crate) struct PendingRequest {
    tx: oneshot::Sender<RequestOutcome>,
    deadline: Instant,
}

#[derive(Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    /// Record a request. The entry is removed when the returned guard drops.
    pub(crate) fn register(
        &self,
        id: &str,
        timeout: Duration,
    ) -> (oneshot::Receiver<RequestOutcome>, Instant, PendingGuard<'_>) {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        self.inner
            .lock()
            .insert(id.to_string(), PendingRequest { tx, deadline });
        let guard = PendingGuard {
            table: self,
            id: id.to_string(),
        };
        (rx, deadline, guard)
    }

    /// Complete a request. Returns `false` for unknown ids.
    pub(crate) fn resolve(&self, id: &str, outcome: RequestOutcome) -> bool {
        let Some(request) = self.inner.lock().remove(id) else {
            return false;
        };
        let _ = request.tx.send(outcome);
        true
    }

    /// Fail every outstanding request. Returns how many were rejected.
    pub(crate) fn reject_all(&self, error: impl Fn() -> ClientError) -> usize {
        let drained: Vec<PendingRequest> = self.inner.lock().drain().map(|(_, r)| r).collect();
        let count = drained.len();
        for request in drained {
            let _ = request.tx.send(Err(error()));
        }
        count
    }

    pub(crate) fn remove(&self, id: &str) {
        self.inner.lock().remove(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Outstanding ids with their deadlines, earliest first.
    pub(crate) fn deadlines(&self) -> Vec<(String, Instant)> {
        let mut deadlines: Vec<(String, Instant)> = self
            .inner
            .lock()
            .iter()
            .map(|(id, request)| (id.clone(), request.deadline))
            .collect();
        deadlines.sort_by_key(|(_, deadline)| *deadline);
        deadlines
    }
}

/// Removes its entry on drop, so abandoned calls leave nothing behind.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingRequests,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}
