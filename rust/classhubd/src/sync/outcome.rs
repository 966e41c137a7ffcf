use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::SyncError;
use crate::model::EntityKind;
use crate::remote::RemoteError;

/// How far a write got. Local persistence is the floor; the remote copy is
/// best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Durability {
    PersistedLocally,
    PersistedLocallyAndRemotely,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemotePush {
    /// No remote backend, or the entity could not be encoded.
    Skipped,
    Confirmed,
    Failed(String),
}

impl RemotePush {
    pub fn durability(&self) -> Durability {
        match self {
            Self::Confirmed => Durability::PersistedLocallyAndRemotely,
            Self::Skipped | Self::Failed(_) => Durability::PersistedLocally,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A locally committed change with its remote push still in flight.
///
/// Dropping a `Mutation` detaches the push; it still runs to completion.
#[derive(Debug)]
pub struct Mutation {
    kind: EntityKind,
    key: String,
    push: Option<JoinHandle<Result<(), RemoteError>>>,
}

impl Mutation {
    pub(crate) fn new(kind: EntityKind, key: String, push: Option<JoinHandle<Result<(), RemoteError>>>) -> Self {
        Self { kind, key, push }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the remote push and reports how it ended.
    pub async fn settle(self) -> RemotePush {
        let Some(push) = self.push else {
            return RemotePush::Skipped;
        };
        match push.await {
            Ok(Ok(())) => RemotePush::Confirmed,
            Ok(Err(e)) => RemotePush::Failed(e.to_string()),
            Err(e) => {
                warn!(kind = %self.kind, key = %self.key, error = %e, "remote push task died");
                RemotePush::Failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscribeOutcome {
    Active,
    AlreadyActive,
    /// Real-time sync unavailable; load and mutate keep working.
    Unavailable,
}

/// Aggregate of a bulk submit/clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub attempted: usize,
    pub applied: usize,
    pub remote_confirmed: usize,
    pub remote_failed: usize,
}

impl BulkOutcome {
    pub fn is_partial(&self) -> bool {
        self.remote_failed > 0
    }

    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_partial() {
            return Err(SyncError::PartialBulkFailure {
                attempted: self.attempted,
                failed: self.remote_failed,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDeletion {
    pub responses_removed: usize,
    pub durability: Durability,
}
