//! Operation-level failures of the sync engine.

use marketsync_core::DomainError;
use marketsync_infra::StoreError;

/// Why a sync operation (or one step of a composite sync) failed.
///
/// Per-item server rejections are *not* represented here: they are normal
/// outcomes reported inside an `UploadReport`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Network unreachable, timeout, or a non-success response. Nothing was
    /// changed locally.
    #[error("transport failure (status {status_code}): {message}")]
    Transport { status_code: u16, message: String },

    /// The server answered successfully but the payload was not understood.
    #[error("unexpected response payload: {0}")]
    Decode(String),

    /// Local persistence failed; fatal for the current operation.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// A mutation was rejected before being queued.
    #[error(transparent)]
    Validation(#[from] DomainError),

    /// Another upload or composite sync is already running for this session.
    #[error("a sync operation is already in progress")]
    AlreadyInProgress,

    /// The task running the operation was cancelled, typically because the
    /// runtime is shutting down.
    #[error("sync task did not complete: {0}")]
    Interrupted(String),
}

impl SyncError {
    pub fn transport(status_code: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status_code,
            message: message.into(),
        }
    }

    /// Storage failures abort composite operations instead of being recorded
    /// as one failed step.
    pub fn is_storage(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }
}
