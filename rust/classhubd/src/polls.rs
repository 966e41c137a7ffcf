use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Poll, PollAnswer, PollResponse, Student};
use crate::view::csv_row;

/// The poll's embedded answers overlaid by standalone response records for
/// the same poll.
pub fn effective_responses<'a>(
    poll: &Poll,
    responses: impl IntoIterator<Item = &'a PollResponse>,
) -> BTreeMap<String, PollAnswer> {
    let mut out = poll.responses.clone();
    for r in responses {
        if r.poll_id == poll.id {
            out.insert(r.register_number.clone(), r.response);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub register: String,
    pub name: String,
}

impl From<&Student> for StudentRef {
    fn from(s: &Student) -> Self {
        Self {
            register: s.register.clone(),
            name: s.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    pub poll_id: String,
    pub question: String,
    pub response_count: usize,
    pub yes_count: usize,
    pub no_count: usize,
    pub yes: Vec<StudentRef>,
    pub no: Vec<StudentRef>,
    pub pending: Vec<StudentRef>,
}

/// Counts cover every recorded answer; the yes/no/pending lists follow
/// roster order and only include roster students.
pub fn results(poll: &Poll, answers: &BTreeMap<String, PollAnswer>, roster: &[Student]) -> PollResults {
    let mut yes = Vec::new();
    let mut no = Vec::new();
    let mut pending = Vec::new();
    for s in roster {
        match answers.get(&s.register) {
            Some(PollAnswer::Yes) => yes.push(StudentRef::from(s)),
            Some(PollAnswer::No) => no.push(StudentRef::from(s)),
            None => pending.push(StudentRef::from(s)),
        }
    }
    PollResults {
        poll_id: poll.id.clone(),
        question: poll.question.clone(),
        response_count: answers.len(),
        yes_count: answers.values().filter(|a| **a == PollAnswer::Yes).count(),
        no_count: answers.values().filter(|a| **a == PollAnswer::No).count(),
        yes,
        no,
        pending,
    }
}

pub fn export_csv(answers: &BTreeMap<String, PollAnswer>, roster: &[Student]) -> String {
    let mut lines = vec![csv_row(["Register Number", "Name", "Response"])];
    for s in roster {
        let answer = answers
            .get(&s.register)
            .map(|a| a.as_str())
            .unwrap_or("No Response");
        lines.push(csv_row([s.register.as_str(), s.name.as_str(), answer]));
    }
    lines.join("\n")
}
