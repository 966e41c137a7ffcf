use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "Boy",
            Self::Female => "Girl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub register: String,
    pub name: String,
    pub gender: Gender,
}

/// Submission state for one register number.
///
/// Fields are private so that `submitted == false` always implies an empty
/// timestamp, including for records decoded from the cache or the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SubmissionWire", rename_all = "camelCase")]
pub struct SubmissionRecord {
    register_number: String,
    submitted: bool,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionWire {
    #[serde(default)]
    register_number: Option<String>,
    #[serde(default)]
    submitted: bool,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl From<SubmissionWire> for SubmissionRecord {
    fn from(w: SubmissionWire) -> Self {
        Self {
            register_number: w.register_number.unwrap_or_default(),
            submitted: w.submitted,
            timestamp: if w.submitted { w.timestamp } else { None },
        }
    }
}

impl SubmissionRecord {
    pub fn new(register: impl Into<String>, submitted: bool, now: DateTime<Utc>) -> Self {
        Self {
            register_number: register.into(),
            submitted,
            timestamp: submitted.then_some(now),
        }
    }

    pub fn register_number(&self) -> &str {
        &self.register_number
    }

    pub fn submitted(&self) -> bool {
        self.submitted
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub(crate) fn with_register_fallback(mut self, register: &str) -> Self {
        if self.register_number.is_empty() {
            self.register_number = register.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollAnswer {
    Yes,
    No,
}

impl PollAnswer {
    pub fn all() -> Vec<Self> {
        vec![Self::Yes, Self::No]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Yes" | "yes" => Some(Self::Yes),
            "No" | "no" => Some(Self::No),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub question: String,
    #[serde(default = "PollAnswer::all")]
    pub options: Vec<PollAnswer>,
    #[serde(default)]
    pub responses: BTreeMap<String, PollAnswer>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub poll_id: String,
    pub register_number: String,
    pub response: PollAnswer,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PollResponse {
    pub fn key(&self) -> String {
        response_key(&self.poll_id, &self.register_number)
    }
}

pub fn response_key(poll_id: &str, register: &str) -> String {
    format!("{}_{}", poll_id, register)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Submissions,
    Polls,
    PollResponses,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Submissions, Self::Polls, Self::PollResponses];

    /// Local cache key and remote collection name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submissions => "submissions",
            Self::Polls => "polls",
            Self::PollResponses => "pollResponses",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submissions" => Some(Self::Submissions),
            "polls" => Some(Self::Polls),
            "pollResponses" => Some(Self::PollResponses),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full state of one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Submissions(BTreeMap<String, SubmissionRecord>),
    Polls(Vec<Poll>),
    PollResponses(BTreeMap<String, PollResponse>),
}

impl Snapshot {
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Submissions => Self::Submissions(BTreeMap::new()),
            EntityKind::Polls => Self::Polls(Vec::new()),
            EntityKind::PollResponses => Self::PollResponses(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Submissions(_) => EntityKind::Submissions,
            Self::Polls(_) => EntityKind::Polls,
            Self::PollResponses(_) => EntityKind::PollResponses,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Submissions(m) => m.len(),
            Self::Polls(v) => v.len(),
            Self::PollResponses(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single changed entity, tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Submission(SubmissionRecord),
    Poll(Poll),
    PollResponse(PollResponse),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Submission(_) => EntityKind::Submissions,
            Self::Poll(_) => EntityKind::Polls,
            Self::PollResponse(_) => EntityKind::PollResponses,
        }
    }

    pub fn key(&self) -> String {
        match self {
            Self::Submission(r) => r.register_number().to_string(),
            Self::Poll(p) => p.id.clone(),
            Self::PollResponse(r) => r.key(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Submission(r) => serde_json::to_value(r),
            Self::Poll(p) => serde_json::to_value(p),
            Self::PollResponse(r) => serde_json::to_value(r),
        }
    }
}
