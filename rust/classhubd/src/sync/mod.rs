//! Reconciles the local cache, the remote backend and real-time pushes.
//!
//! The coordinator is owned by a single task. Remote pushes and subscription
//! forwarders run as spawned tasks but never touch the mirrors; snapshots
//! they receive come back through one channel and are applied by the owner in
//! `next_update`.

mod outcome;
mod state;

pub use outcome::{BulkOutcome, Durability, Mutation, PollDeletion, RemotePush, SubscribeOutcome};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::model::{
    response_key, Entity, EntityKind, Poll, PollAnswer, PollResponse, Snapshot, SubmissionRecord,
};
use crate::remote::{RemoteBackend, RemoteError};
use crate::store::LocalStore;
use state::{decode_snapshot, overlay, read_local, SyncState};

pub type UpdateCallback = Box<dyn FnMut(&Snapshot) + Send>;

/// A pushed snapshot after it has been applied to the mirrors.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncUpdate {
    pub kind: EntityKind,
    pub snapshot: Snapshot,
}

struct Pushed {
    kind: EntityKind,
    generation: u64,
    snapshot: Snapshot,
}

struct ActiveSubscription {
    generation: u64,
    forwarder: JoinHandle<()>,
    on_update: Option<UpdateCallback>,
}

pub struct SyncCoordinator {
    store: Box<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteBackend>>,
    state: SyncState,
    subscriptions: HashMap<EntityKind, ActiveSubscription>,
    updates_tx: mpsc::UnboundedSender<Pushed>,
    updates_rx: mpsc::UnboundedReceiver<Pushed>,
    next_generation: u64,
}

impl SyncCoordinator {
    /// Starts from whatever the local cache holds; nothing remote is read
    /// until `load`.
    pub fn new(store: Box<dyn LocalStore>, remote: Option<Arc<dyn RemoteBackend>>) -> Self {
        let state = SyncState::from_local(store.as_ref());
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            store,
            remote,
            state,
            subscriptions: HashMap::new(),
            updates_tx,
            updates_rx,
            next_generation: 0,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote_name(&self) -> Option<&'static str> {
        self.remote.as_ref().map(|r| r.name())
    }

    pub fn store(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn LocalStore {
        self.store.as_mut()
    }

    pub fn submissions(&self) -> &BTreeMap<String, SubmissionRecord> {
        &self.state.submissions
    }

    pub fn polls(&self) -> &[Poll] {
        &self.state.polls
    }

    pub fn poll(&self, id: &str) -> Option<&Poll> {
        self.state.polls.iter().find(|p| p.id == id)
    }

    pub fn poll_responses(&self) -> &BTreeMap<String, PollResponse> {
        &self.state.poll_responses
    }

    pub fn snapshot(&self, kind: EntityKind) -> Snapshot {
        self.state.snapshot(kind)
    }

    fn persist(&mut self, kind: EntityKind) -> Result<(), SyncError> {
        let encoded = self.state.encode(kind).map_err(|e| SyncError::LocalPersistence {
            kind,
            message: e.to_string(),
        })?;
        self.store.set(kind.as_str(), &encoded).map_err(|e| {
            error!(%kind, error = %e, "local cache write failed");
            SyncError::LocalPersistence {
                kind,
                message: e.to_string(),
            }
        })
    }

    /// Local cache overlaid with the remote collection, written back and
    /// returned. Never fails; remote errors are logged.
    pub async fn load(&mut self, kind: EntityKind) -> Snapshot {
        let mut merged = read_local(self.store.as_ref(), kind);
        if let Some(remote) = &self.remote {
            match remote.get_all(kind.as_str()).await {
                Ok(docs) => {
                    debug!(%kind, count = docs.len(), "fetched remote collection");
                    merged = overlay(merged, decode_snapshot(kind, docs));
                }
                Err(e) => warn!(%kind, error = %e, "remote fetch failed; using local cache"),
            }
        }
        self.state.replace(merged.clone());
        if let Err(e) = self.persist(kind) {
            warn!(%kind, error = %e, "could not write merged snapshot back to the local cache");
        }
        merged
    }

    /// Applies one entity in memory, persists the whole kind locally, then
    /// starts a best-effort remote push. A failed local write rolls the
    /// mirror back and nothing is pushed.
    pub fn mutate(&mut self, entity: Entity) -> Result<Mutation, SyncError> {
        let kind = entity.kind();
        let key = entity.key();
        let before = self.state.snapshot(kind);
        self.state.apply(entity.clone());
        if let Err(e) = self.persist(kind) {
            self.state.replace(before);
            return Err(e);
        }
        let push = self.spawn_push(kind, &key, &entity);
        Ok(Mutation::new(kind, key, push))
    }

    fn spawn_push(
        &self,
        kind: EntityKind,
        key: &str,
        entity: &Entity,
    ) -> Option<JoinHandle<Result<(), RemoteError>>> {
        let remote = self.remote.clone()?;
        let mut fields = match entity.to_json() {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return None,
            Err(e) => {
                warn!(%kind, key, error = %e, "could not encode entity for remote push");
                return None;
            }
        };
        fields.insert("updatedAt".into(), json!(Utc::now().to_rfc3339()));
        let key = key.to_string();
        Some(tokio::spawn(async move {
            let result = remote.upsert(kind.as_str(), &key, fields, true).await;
            match &result {
                Ok(()) => debug!(%kind, key = %key, "remote push confirmed"),
                Err(e) => warn!(%kind, key = %key, error = %e, "remote push failed; kept locally"),
            }
            result
        }))
    }

    pub fn set_submitted(
        &mut self,
        register: &str,
        submitted: bool,
        now: DateTime<Utc>,
    ) -> Result<Mutation, SyncError> {
        self.mutate(Entity::Submission(SubmissionRecord::new(register, submitted, now)))
    }

    /// One mutate per register, then waits for every push. Stops at the
    /// first local failure; pushes already started are left to finish.
    pub async fn set_submitted_many(
        &mut self,
        registers: &[String],
        submitted: bool,
        now: DateTime<Utc>,
    ) -> Result<BulkOutcome, SyncError> {
        let mut mutations = Vec::with_capacity(registers.len());
        for register in registers {
            mutations.push(self.set_submitted(register, submitted, now)?);
        }
        let pushes = join_all(mutations.into_iter().map(Mutation::settle)).await;
        let outcome = BulkOutcome {
            attempted: registers.len(),
            applied: pushes.len(),
            remote_confirmed: pushes
                .iter()
                .filter(|p| matches!(p, RemotePush::Confirmed))
                .count(),
            remote_failed: pushes.iter().filter(|p| p.failed()).count(),
        };
        if outcome.is_partial() {
            warn!(
                attempted = outcome.attempted,
                failed = outcome.remote_failed,
                "bulk update only partly reached the remote"
            );
        } else {
            info!(count = outcome.applied, submitted, "bulk update applied");
        }
        Ok(outcome)
    }

    pub fn create_poll(&mut self, question: &str, now: DateTime<Utc>) -> Result<(Poll, Mutation), SyncError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SyncError::validation("Please enter a poll question"));
        }
        let mut stamp = now;
        let mut id = format!("poll_{}", stamp.timestamp_millis());
        while self.poll(&id).is_some() {
            stamp += Duration::milliseconds(1);
            id = format!("poll_{}", stamp.timestamp_millis());
        }
        let poll = Poll {
            id,
            question: question.to_string(),
            options: PollAnswer::all(),
            responses: BTreeMap::new(),
            created_at: now,
            active: true,
        };
        let mutation = self.mutate(Entity::Poll(poll.clone()))?;
        info!(poll = %poll.id, "poll created");
        Ok((poll, mutation))
    }

    /// Records the answer as a PollResponse and in the local copy of the
    /// poll's embedded map. Both caches are written or neither is. Only the
    /// response record is pushed; the remote poll document is left untouched.
    pub fn respond(
        &mut self,
        poll_id: &str,
        register: &str,
        answer: PollAnswer,
        now: DateTime<Utc>,
    ) -> Result<Mutation, SyncError> {
        let Some(mut poll) = self.poll(poll_id).cloned() else {
            return Err(SyncError::validation(format!("unknown poll: {}", poll_id)));
        };
        let response = Entity::PollResponse(PollResponse {
            poll_id: poll_id.to_string(),
            register_number: register.to_string(),
            response: answer,
            timestamp: Some(now),
        });
        poll.responses.insert(register.to_string(), answer);

        let responses_before = self.state.snapshot(EntityKind::PollResponses);
        let polls_before = self.state.snapshot(EntityKind::Polls);
        self.state.apply(response.clone());
        self.state.apply(Entity::Poll(poll));

        let persisted = self
            .persist(EntityKind::PollResponses)
            .and_then(|()| self.persist(EntityKind::Polls));
        if let Err(e) = persisted {
            self.state.replace(responses_before);
            self.state.replace(polls_before);
            let _ = self.persist(EntityKind::PollResponses);
            let _ = self.persist(EntityKind::Polls);
            return Err(e);
        }

        let key = response.key();
        let push = self.spawn_push(EntityKind::PollResponses, &key, &response);
        Ok(Mutation::new(EntityKind::PollResponses, key, push))
    }

    /// Removes the poll and its responses locally, then deletes them remotely
    /// on a best-effort basis.
    pub async fn delete_poll(&mut self, poll_id: &str) -> Result<PollDeletion, SyncError> {
        if self.poll(poll_id).is_none() {
            return Err(SyncError::validation(format!("unknown poll: {}", poll_id)));
        }
        let polls_before = self.state.snapshot(EntityKind::Polls);
        let responses_before = self.state.snapshot(EntityKind::PollResponses);

        self.state.polls.retain(|p| p.id != poll_id);
        let before_len = self.state.poll_responses.len();
        self.state.poll_responses.retain(|_, r| r.poll_id != poll_id);
        let responses_removed = before_len - self.state.poll_responses.len();

        let persisted = self
            .persist(EntityKind::Polls)
            .and_then(|()| self.persist(EntityKind::PollResponses));
        if let Err(e) = persisted {
            self.state.replace(polls_before);
            self.state.replace(responses_before);
            // Best effort to put the cache back in line with the mirrors.
            let _ = self.persist(EntityKind::Polls);
            let _ = self.persist(EntityKind::PollResponses);
            return Err(e);
        }

        let Some(remote) = self.remote.clone() else {
            return Ok(PollDeletion {
                responses_removed,
                durability: Durability::PersistedLocally,
            });
        };
        let remote_result = async {
            remote
                .delete_many(EntityKind::Polls.as_str(), &[poll_id.to_string()])
                .await?;
            let docs = remote
                .query(EntityKind::PollResponses.as_str(), "pollId", &json!(poll_id))
                .await?;
            let ids: Vec<String> = docs.into_iter().map(|d| d.id).collect();
            if !ids.is_empty() {
                remote
                    .delete_many(EntityKind::PollResponses.as_str(), &ids)
                    .await?;
            }
            Ok::<(), RemoteError>(())
        }
        .await;
        let durability = match remote_result {
            Ok(()) => Durability::PersistedLocallyAndRemotely,
            Err(e) => {
                warn!(poll = poll_id, error = %e, "remote poll delete failed; removed locally");
                Durability::PersistedLocally
            }
        };
        info!(poll = poll_id, responses_removed, "poll deleted");
        Ok(PollDeletion {
            responses_removed,
            durability,
        })
    }

    /// Clears each listed kind remotely and locally. A kind whose remote
    /// delete fails keeps its local data and is reported in `PartialReset`.
    pub async fn reset_all(&mut self, kinds: &[EntityKind]) -> Result<Vec<EntityKind>, SyncError> {
        let mut cleared = Vec::new();
        let mut failed = Vec::new();
        let mut seen = Vec::new();
        for &kind in kinds {
            if seen.contains(&kind) {
                continue;
            }
            seen.push(kind);

            if let Some(remote) = self.remote.clone() {
                let result = async {
                    let docs = remote.get_all(kind.as_str()).await?;
                    let ids: Vec<String> = docs.into_iter().map(|d| d.id).collect();
                    if !ids.is_empty() {
                        remote.delete_many(kind.as_str(), &ids).await?;
                    }
                    Ok::<(), RemoteError>(())
                }
                .await;
                if let Err(e) = result {
                    warn!(%kind, error = %e, "remote reset failed; keeping local data");
                    failed.push((kind, e.to_string()));
                    continue;
                }
            }

            match self.store.remove(kind.as_str()) {
                Ok(()) => {
                    self.state.clear(kind);
                    cleared.push(kind);
                }
                Err(e) => {
                    error!(%kind, error = %e, "could not clear local cache");
                    failed.push((kind, format!("local cache: {}", e)));
                }
            }
        }

        if failed.is_empty() {
            info!(kinds = ?cleared, "reset complete");
            Ok(cleared)
        } else {
            Err(SyncError::PartialReset { cleared, failed })
        }
    }

    /// Opens the real-time channel for `kind`. Calling it again while active
    /// is a no-op.
    pub async fn subscribe(&mut self, kind: EntityKind, on_update: Option<UpdateCallback>) -> SubscribeOutcome {
        if self.subscriptions.contains_key(&kind) {
            debug!(%kind, "already subscribed");
            return SubscribeOutcome::AlreadyActive;
        }
        let Some(remote) = self.remote.clone() else {
            info!(%kind, "no remote backend; real-time sync unavailable");
            return SubscribeOutcome::Unavailable;
        };
        let mut subscription = match remote.subscribe(kind.as_str()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%kind, error = %e, "real-time sync unavailable");
                return SubscribeOutcome::Unavailable;
            }
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.updates_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(docs) = subscription.next().await {
                let snapshot = decode_snapshot(kind, docs);
                if tx
                    .send(Pushed {
                        kind,
                        generation,
                        snapshot,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
        self.subscriptions.insert(
            kind,
            ActiveSubscription {
                generation,
                forwarder,
                on_update,
            },
        );
        info!(%kind, generation, "real-time sync active");
        SubscribeOutcome::Active
    }

    /// Tears down the channel for `kind`. Snapshots it already queued are
    /// discarded.
    pub fn unsubscribe(&mut self, kind: EntityKind) -> bool {
        match self.subscriptions.remove(&kind) {
            Some(sub) => {
                sub.forwarder.abort();
                info!(%kind, "real-time sync stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, kind: EntityKind) -> bool {
        self.subscriptions.contains_key(&kind)
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Waits for the next pushed snapshot of a live subscription and applies
    /// it. Pends forever while nothing is subscribed.
    pub async fn next_update(&mut self) -> Option<SyncUpdate> {
        loop {
            let pushed = self.updates_rx.recv().await?;
            if let Some(update) = self.apply_pushed(pushed) {
                return Some(update);
            }
        }
    }

    /// Like `next_update` but only drains what is already queued.
    pub fn try_next_update(&mut self) -> Option<SyncUpdate> {
        while let Ok(pushed) = self.updates_rx.try_recv() {
            if let Some(update) = self.apply_pushed(pushed) {
                return Some(update);
            }
        }
        None
    }

    fn apply_pushed(&mut self, pushed: Pushed) -> Option<SyncUpdate> {
        let live = self
            .subscriptions
            .get(&pushed.kind)
            .is_some_and(|s| s.generation == pushed.generation);
        if !live {
            debug!(kind = %pushed.kind, generation = pushed.generation, "dropping snapshot from a closed subscription");
            return None;
        }
        let kind = pushed.kind;
        self.state.replace(pushed.snapshot.clone());
        if let Err(e) = self.persist(kind) {
            warn!(%kind, error = %e, "pushed snapshot kept in memory only");
        }
        if let Some(callback) = self
            .subscriptions
            .get_mut(&kind)
            .and_then(|s| s.on_update.as_mut())
        {
            callback(&pushed.snapshot);
        }
        Some(SyncUpdate {
            kind,
            snapshot: pushed.snapshot,
        })
    }

    pub fn responses_for(&self, poll_id: &str) -> impl Iterator<Item = &PollResponse> {
        let poll_id = poll_id.to_string();
        self.state
            .poll_responses
            .values()
            .filter(move |r| r.poll_id == poll_id)
    }

    pub fn response_of(&self, poll_id: &str, register: &str) -> Option<&PollResponse> {
        self.state.poll_responses.get(&response_key(poll_id, register))
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        for (_, sub) in self.subscriptions.drain() {
            sub.forwarder.abort();
        }
    }
}
