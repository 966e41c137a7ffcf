use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::{Entity, EntityKind, Poll, PollResponse, Snapshot, SubmissionRecord};
use crate::remote::{Document, Fields};
use crate::store::{get_json, LocalStore};

/// In-memory mirror of every entity kind.
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub submissions: BTreeMap<String, SubmissionRecord>,
    pub polls: Vec<Poll>,
    pub poll_responses: BTreeMap<String, PollResponse>,
}

impl SyncState {
    pub fn from_local(store: &dyn LocalStore) -> Self {
        let mut state = Self::default();
        for kind in EntityKind::ALL {
            state.replace(read_local(store, kind));
        }
        state
    }

    pub fn snapshot(&self, kind: EntityKind) -> Snapshot {
        match kind {
            EntityKind::Submissions => Snapshot::Submissions(self.submissions.clone()),
            EntityKind::Polls => Snapshot::Polls(self.polls.clone()),
            EntityKind::PollResponses => Snapshot::PollResponses(self.poll_responses.clone()),
        }
    }

    pub fn replace(&mut self, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Submissions(m) => self.submissions = m,
            Snapshot::Polls(v) => self.polls = v,
            Snapshot::PollResponses(m) => self.poll_responses = m,
        }
    }

    pub fn clear(&mut self, kind: EntityKind) {
        self.replace(Snapshot::empty(kind));
    }

    pub fn apply(&mut self, entity: Entity) {
        match entity {
            Entity::Submission(r) => {
                self.submissions.insert(r.register_number().to_string(), r);
            }
            Entity::Poll(p) => match self.polls.iter_mut().find(|q| q.id == p.id) {
                Some(slot) => *slot = p,
                None => self.polls.insert(0, p),
            },
            Entity::PollResponse(r) => {
                self.poll_responses.insert(r.key(), r);
            }
        }
    }

    pub fn encode(&self, kind: EntityKind) -> serde_json::Result<String> {
        match kind {
            EntityKind::Submissions => serde_json::to_string(&self.submissions),
            EntityKind::Polls => serde_json::to_string(&self.polls),
            EntityKind::PollResponses => serde_json::to_string(&self.poll_responses),
        }
    }
}

/// Reads one kind from the local cache; absent or malformed means empty.
pub(crate) fn read_local(store: &dyn LocalStore, kind: EntityKind) -> Snapshot {
    let key = kind.as_str();
    match kind {
        EntityKind::Submissions => {
            let map: BTreeMap<String, SubmissionRecord> = get_json(store, key).unwrap_or_default();
            Snapshot::Submissions(
                map.into_iter()
                    .map(|(k, r)| {
                        let r = r.with_register_fallback(&k);
                        (k, r)
                    })
                    .collect(),
            )
        }
        EntityKind::Polls => Snapshot::Polls(get_json(store, key).unwrap_or_default()),
        EntityKind::PollResponses => Snapshot::PollResponses(get_json(store, key).unwrap_or_default()),
    }
}

fn decode<T: DeserializeOwned>(kind: EntityKind, id: &str, fields: Fields) -> Option<T> {
    match serde_json::from_value(Value::Object(fields)) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%kind, id, error = %e, "skipping undecodable remote document");
            None
        }
    }
}

/// Turns a full remote collection into a snapshot. Polls come back newest
/// first.
pub(crate) fn decode_snapshot(kind: EntityKind, docs: Vec<Document>) -> Snapshot {
    match kind {
        EntityKind::Submissions => Snapshot::Submissions(
            docs.into_iter()
                .filter_map(|d| {
                    let rec: SubmissionRecord = decode(kind, &d.id, d.fields)?;
                    let rec = rec.with_register_fallback(&d.id);
                    Some((d.id, rec))
                })
                .collect(),
        ),
        EntityKind::Polls => {
            let mut polls: Vec<Poll> = docs
                .into_iter()
                .filter_map(|d| {
                    let mut fields = d.fields;
                    fields
                        .entry("id")
                        .or_insert_with(|| Value::String(d.id.clone()));
                    decode(kind, &d.id, fields)
                })
                .collect();
            polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Snapshot::Polls(polls)
        }
        EntityKind::PollResponses => Snapshot::PollResponses(
            docs.into_iter()
                .filter_map(|d| {
                    let resp: PollResponse = decode(kind, &d.id, d.fields)?;
                    Some((d.id, resp))
                })
                .collect(),
        ),
    }
}

/// Key-value kinds merge remote over local per key. Polls are replaced
/// wholesale by a non-empty remote list.
pub(crate) fn overlay(local: Snapshot, remote: Snapshot) -> Snapshot {
    match (local, remote) {
        (Snapshot::Submissions(mut l), Snapshot::Submissions(r)) => {
            l.extend(r);
            Snapshot::Submissions(l)
        }
        (Snapshot::PollResponses(mut l), Snapshot::PollResponses(r)) => {
            l.extend(r);
            Snapshot::PollResponses(l)
        }
        (Snapshot::Polls(l), Snapshot::Polls(r)) => Snapshot::Polls(if r.is_empty() { l } else { r }),
        (local, _) => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        Document {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn remote_polls_sorted_newest_first_and_id_filled_in() {
        let docs = vec![
            doc("poll_1", json!({"question": "old", "createdAt": "2026-01-01T00:00:00Z"})),
            doc("poll_2", json!({"question": "new", "createdAt": "2026-02-01T00:00:00Z"})),
        ];
        let Snapshot::Polls(polls) = decode_snapshot(EntityKind::Polls, docs) else {
            panic!("expected polls");
        };
        assert_eq!(polls[0].id, "poll_2");
        assert_eq!(polls[1].id, "poll_1");
    }

    #[test]
    fn bad_remote_documents_are_skipped() {
        let docs = vec![
            doc("R1", json!({"submitted": true, "timestamp": "2026-01-21T08:45:00Z"})),
            doc("R2", json!({"submitted": "maybe"})),
        ];
        let Snapshot::Submissions(map) = decode_snapshot(EntityKind::Submissions, docs) else {
            panic!("expected submissions");
        };
        assert_eq!(map.len(), 1);
        assert_eq!(map["R1"].register_number(), "R1");
        assert_eq!(
            map["R1"].timestamp(),
            Some(Utc.with_ymd_and_hms(2026, 1, 21, 8, 45, 0).unwrap())
        );
    }

    #[test]
    fn poll_overlay_keeps_local_when_remote_empty() {
        let local = Snapshot::Polls(vec![Poll {
            id: "poll_1".into(),
            question: "q".into(),
            options: crate::model::PollAnswer::all(),
            responses: BTreeMap::new(),
            created_at: Utc::now(),
            active: true,
        }]);
        let merged = overlay(local.clone(), Snapshot::Polls(Vec::new()));
        assert_eq!(merged, local);
    }
}
