use crate::model::EntityKind;
use thiserror::Error;

/// Errors that cross the sync coordinator boundary.
///
/// Remote failures never surface here; they are logged and folded into
/// `Durability`/`SubscribeOutcome` values instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to write {kind} to the local cache: {message}")]
    LocalPersistence { kind: EntityKind, message: String },
    #[error("{failed} of {attempted} remote pushes failed; all local changes were kept")]
    PartialBulkFailure { attempted: usize, failed: usize },
    #[error("reset incomplete: cleared {cleared:?}, failed {failed:?}")]
    PartialReset {
        cleared: Vec<EntityKind>,
        failed: Vec<(EntityKind, String)>,
    },
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Error code used in IPC envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::LocalPersistence { .. } => "local_persistence_failed",
            Self::PartialBulkFailure { .. } => "partial_bulk_failure",
            Self::PartialReset { .. } => "partial_reset",
        }
    }
}
