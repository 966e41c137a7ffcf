//! Filtering, sorting and tabulation of the roster against submissions.
//! Everything here is a pure function of its inputs except the preference
//! load/save helpers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::{Gender, Student, SubmissionRecord};
use crate::store::LocalStore;

pub const PREF_GENDER: &str = "filterGender";
pub const PREF_SUBMISSION: &str = "filterSubmission";
pub const PREF_SORT: &str = "sortBy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    #[default]
    All,
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionFilter {
    #[default]
    All,
    Submitted,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Register,
    Name,
    Time,
}

impl GenderFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    fn admits(self, gender: Gender) -> bool {
        match self {
            Self::All => true,
            Self::Male => gender == Gender::Male,
            Self::Female => gender == Gender::Female,
        }
    }
}

impl SubmissionFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "submitted" => Some(Self::Submitted),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Submitted => "submitted",
            Self::Pending => "pending",
        }
    }
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "register" => Some(Self::Register),
            "name" => Some(Self::Name),
            "time" => Some(Self::Time),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Name => "name",
            Self::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPrefs {
    pub gender: GenderFilter,
    pub submission: SubmissionFilter,
    pub sort_by: SortKey,
}

impl ViewPrefs {
    /// Absent or unrecognised stored values fall back to the defaults.
    pub fn load(store: &dyn LocalStore) -> Self {
        Self {
            gender: store
                .get(PREF_GENDER)
                .and_then(|v| GenderFilter::parse(&v))
                .unwrap_or_default(),
            submission: store
                .get(PREF_SUBMISSION)
                .and_then(|v| SubmissionFilter::parse(&v))
                .unwrap_or_default(),
            sort_by: store
                .get(PREF_SORT)
                .and_then(|v| SortKey::parse(&v))
                .unwrap_or_default(),
        }
    }

    pub fn save(&self, store: &mut dyn LocalStore) -> anyhow::Result<()> {
        store.set(PREF_GENDER, self.gender.as_str())?;
        store.set(PREF_SUBMISSION, self.submission.as_str())?;
        store.set(PREF_SORT, self.sort_by.as_str())?;
        Ok(())
    }

    pub fn reset(store: &mut dyn LocalStore) -> Self {
        for key in [PREF_GENDER, PREF_SUBMISSION, PREF_SORT] {
            if let Err(e) = store.remove(key) {
                warn!(key, error = %e, "could not clear view preference");
            }
        }
        Self::default()
    }
}

fn is_submitted(submissions: &BTreeMap<String, SubmissionRecord>, register: &str) -> bool {
    submissions.get(register).is_some_and(|r| r.submitted())
}

fn timestamp_of(submissions: &BTreeMap<String, SubmissionRecord>, register: &str) -> Option<DateTime<Utc>> {
    submissions.get(register).and_then(|r| r.timestamp())
}

/// Gender filter, then submission filter (missing record = pending), then a
/// stable sort. Time sorts newest first with untimestamped students last.
pub fn derive<'a>(
    roster: &'a [Student],
    submissions: &BTreeMap<String, SubmissionRecord>,
    prefs: &ViewPrefs,
) -> Vec<&'a Student> {
    let mut list: Vec<&Student> = roster
        .iter()
        .filter(|s| prefs.gender.admits(s.gender))
        .filter(|s| match prefs.submission {
            SubmissionFilter::All => true,
            SubmissionFilter::Submitted => is_submitted(submissions, &s.register),
            SubmissionFilter::Pending => !is_submitted(submissions, &s.register),
        })
        .collect();

    match prefs.sort_by {
        SortKey::Register => list.sort_by(|a, b| a.register.cmp(&b.register)),
        SortKey::Name => list.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Time => list.sort_by(|a, b| {
            let ta = timestamp_of(submissions, &a.register);
            let tb = timestamp_of(submissions, &b.register);
            match (ta, tb) {
                (Some(ta), Some(tb)) => tb.cmp(&ta),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        }),
    }
    list
}

/// Rounded percentage, half up; zero when `total` is zero.
pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part * 200 + total) / (2 * total)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredStats {
    pub total: usize,
    pub submitted: usize,
    pub pending: usize,
    pub boys: usize,
    pub girls: usize,
    pub submission_rate: u32,
}

pub fn filtered_stats(list: &[&Student], submissions: &BTreeMap<String, SubmissionRecord>) -> FilteredStats {
    let total = list.len();
    let submitted = list
        .iter()
        .filter(|s| is_submitted(submissions, &s.register))
        .count();
    let boys = list.iter().filter(|s| s.gender == Gender::Male).count();
    FilteredStats {
        total,
        submitted,
        pending: total - submitted,
        boys,
        girls: total - boys,
        submission_rate: percent(submitted, total),
    }
}

/// Students whose submission timestamp lies in `[start, end]`.
pub fn within_range<'a>(
    list: &[&'a Student],
    submissions: &BTreeMap<String, SubmissionRecord>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<&'a Student> {
    list.iter()
        .copied()
        .filter(|s| timestamp_of(submissions, &s.register).is_some_and(|t| t >= start && t <= end))
        .collect()
}

pub fn recent<'a>(
    list: &[&'a Student],
    submissions: &BTreeMap<String, SubmissionRecord>,
    hours: i64,
    now: DateTime<Utc>,
) -> Vec<&'a Student> {
    let cutoff = now - Duration::hours(hours);
    list.iter()
        .copied()
        .filter(|s| timestamp_of(submissions, &s.register).is_some_and(|t| t >= cutoff))
        .collect()
}

pub(crate) fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub(crate) fn csv_row<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    cells.into_iter().map(csv_cell).collect::<Vec<_>>().join(",")
}

pub fn export_csv(list: &[&Student], submissions: &BTreeMap<String, SubmissionRecord>) -> String {
    let mut lines = vec![csv_row(["Register Number", "Name", "Gender", "Submitted", "Timestamp"])];
    for s in list {
        let record = submissions.get(&s.register);
        let submitted = if record.is_some_and(|r| r.submitted()) { "Yes" } else { "No" };
        let timestamp = record
            .and_then(|r| r.timestamp())
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "N/A".to_string());
        lines.push(csv_row([
            s.register.as_str(),
            s.name.as_str(),
            s.gender.label(),
            submitted,
            timestamp.as_str(),
        ]));
    }
    lines.join("\n")
}
