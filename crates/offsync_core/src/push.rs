//! Draining the queue through a remote applier.

use thiserror::Error;
use tracing::{debug, info};

use crate::error::CoreResult;
use crate::error_list::OperationErrorList;
use crate::operation::{OperationKind, PendingOperation};
use crate::queue::{OperationQueue, SentOutcome};
use crate::table_error::TableOperationError;

/// Details of a row-level refusal by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteRejection {
    /// Human-readable reason.
    pub message: String,
    /// Status code, if the server sent one.
    pub status_code: Option<i64>,
    /// Raw response body, if any.
    pub server_response: Option<String>,
    /// The server's version of the row, if any.
    pub server_item: Option<serde_json::Value>,
}

impl RemoteRejection {
    /// Creates a rejection with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status_code(mut self, code: i64) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the server's version of the row.
    #[must_use]
    pub fn with_server_item(mut self, item: serde_json::Value) -> Self {
        self.server_item = Some(item);
        self
    }

    fn into_error(self, op: &PendingOperation) -> TableOperationError {
        let mut error = TableOperationError::from_operation(op, self.message);
        if let Some(code) = self.status_code {
            error = error.with_status_code(code);
        }
        if let Some(response) = self.server_response {
            error = error.with_server_response(response);
        }
        if let Some(item) = self.server_item {
            error = error.with_server_item(item);
        }
        error
    }
}

/// Why a remote application failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    /// The server refused this operation. It is recorded and skipped.
    #[error("rejected: {}", .0.message)]
    Rejected(RemoteRejection),

    /// The server could not be reached. The push stops here.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Applies one pending operation to the remote backend.
pub trait RemoteApplier {
    /// Sends the operation.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Rejected`] for a row-level refusal and
    /// [`ApplyError::Unavailable`] when the backend cannot be reached.
    fn apply(&mut self, op: &PendingOperation) -> Result<(), ApplyError>;
}

impl<F> RemoteApplier for F
where
    F: FnMut(&PendingOperation) -> Result<(), ApplyError>,
{
    fn apply(&mut self, op: &PendingOperation) -> Result<(), ApplyError> {
        self(op)
    }
}

/// Outcome of one push pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Operations the remote accepted.
    pub pushed: usize,
    /// Operations the remote refused. Each is recorded in the error list.
    pub rejected: usize,
    /// Operations changed locally while in flight. They stay queued and go
    /// out again with the newer change.
    pub changed: usize,
    /// Set when the pass stopped early because the backend was unavailable.
    pub interrupted: Option<String>,
}

impl PushSummary {
    /// Returns true if every visible operation was handled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

/// Pushes every operation queued before this call, oldest first.
///
/// Operations enqueued while the pass runs wait for the next pass. A rejected
/// operation is recorded in `errors` and the pass continues; an unavailable
/// backend stops the pass and leaves the operation queued.
///
/// An operation is removed only if it is still queued unchanged once the
/// applier returns. A change merged into it meanwhile is sent again in the
/// same pass. An insert the server accepted but that was cancelled locally
/// while in flight is followed up with a delete in the next pass.
///
/// # Errors
///
/// Returns an error if another bookmark is live or the store fails while
/// removing an operation or recording an error.
pub fn push_pending(
    queue: &OperationQueue,
    errors: &OperationErrorList,
    applier: &mut impl RemoteApplier,
) -> CoreResult<PushSummary> {
    let bookmark = queue.bookmark();
    let mut summary = PushSummary::default();

    while let Some(op) = bookmark.peek()? {
        let applied = match applier.apply(&op) {
            Ok(()) => {
                summary.pushed += 1;
                true
            }
            Err(ApplyError::Rejected(rejection)) => {
                errors.add(rejection.into_error(&op))?;
                summary.rejected += 1;
                false
            }
            Err(ApplyError::Unavailable(reason)) => {
                summary.interrupted = Some(reason);
                break;
            }
        };

        match bookmark.dequeue_sent(&op, applied)? {
            SentOutcome::Removed => {}
            SentOutcome::Changed => summary.changed += 1,
            SentOutcome::Gone => {
                let cancelled_insert = applied
                    && op.kind() == OperationKind::Insert
                    && queue
                        .pending_operation(op.table_name(), op.item_id())
                        .is_none();
                if cancelled_insert {
                    debug!(
                        table = op.table_name(),
                        item_id = op.item_id(),
                        "insert cancelled in flight; queueing delete"
                    );
                    queue.enqueue(PendingOperation::delete(op.table_name(), op.item_id()))?;
                }
            }
        }
    }

    info!(
        pushed = summary.pushed,
        rejected = summary.rejected,
        changed = summary.changed,
        remaining = queue.count_pending(),
        interrupted = summary.interrupted.is_some(),
        "push pass finished"
    );
    Ok(summary)
}
