use anyhow::Context;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::{Gender, Student};
use crate::remote::{RemoteBackend, STUDENTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterCounts {
    pub total: usize,
    pub boys: usize,
    pub girls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterSource {
    File,
    Remote,
    Empty,
}

/// Fixed list of students for the session, in load order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    students: Vec<Student>,
}

impl Roster {
    pub fn new(students: Vec<Student>) -> Result<Self, SyncError> {
        {
            let mut seen = HashSet::new();
            for s in &students {
                if s.register.trim().is_empty() {
                    return Err(SyncError::validation("roster entry with an empty register"));
                }
                if !seen.insert(s.register.as_str()) {
                    return Err(SyncError::validation(format!("duplicate register in roster: {}", s.register)));
                }
            }
        }
        Ok(Self { students })
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn get(&self, register: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.register == register)
    }

    pub fn contains(&self, register: &str) -> bool {
        self.get(register).is_some()
    }

    pub fn counts(&self) -> RosterCounts {
        let boys = self
            .students
            .iter()
            .filter(|s| s.gender == Gender::Male)
            .count();
        RosterCounts {
            total: self.students.len(),
            boys,
            girls: self.students.len() - boys,
        }
    }

    /// A purely numeric query finds the first register containing it;
    /// anything else is a case-insensitive match on name or register.
    pub fn search(&self, query: &str) -> Vec<&Student> {
        let q = query.trim();
        if q.is_empty() {
            return self.students.iter().collect();
        }
        if q.chars().all(|c| c.is_ascii_digit()) {
            return self
                .students
                .iter()
                .find(|s| s.register.contains(q))
                .into_iter()
                .collect();
        }
        let needle = q.to_lowercase();
        self.students
            .iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&needle) || s.register.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let students: Vec<Student> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(students)?)
    }

    /// Roster file first, then the remote `students` collection, else empty.
    pub async fn load(path: &Path, remote: Option<&dyn RemoteBackend>) -> anyhow::Result<(Self, RosterSource)> {
        if path.is_file() {
            let roster = Self::from_file(path)?;
            info!(count = roster.len(), path = %path.display(), "roster loaded from file");
            return Ok((roster, RosterSource::File));
        }
        if let Some(remote) = remote {
            match remote.get_all(STUDENTS).await {
                Ok(docs) if !docs.is_empty() => {
                    let mut students = Vec::with_capacity(docs.len());
                    for d in docs {
                        let mut fields = d.fields;
                        fields
                            .entry("register")
                            .or_insert_with(|| serde_json::Value::String(d.id.clone()));
                        match serde_json::from_value::<Student>(serde_json::Value::Object(fields)) {
                            Ok(s) => students.push(s),
                            Err(e) => warn!(id = %d.id, error = %e, "skipping malformed student document"),
                        }
                    }
                    let roster = Self::new(students)?;
                    info!(count = roster.len(), "roster loaded from remote");
                    return Ok((roster, RosterSource::Remote));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "could not fetch roster from remote"),
            }
        }
        warn!(path = %path.display(), "no roster available; starting empty");
        Ok((Self::default(), RosterSource::Empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(register: &str, name: &str, gender: Gender) -> Student {
        Student {
            register: register.into(),
            name: name.into(),
            gender,
        }
    }

    fn sample() -> Roster {
        Roster::new(vec![
            student("927624BEC064", "HARIPRASANTH K", Gender::Male),
            student("927624BEC065", "HARISH N", Gender::Male),
            student("927624BEC070", "DIVYA R", Gender::Female),
        ])
        .expect("roster")
    }

    #[test]
    fn duplicate_registers_are_rejected() {
        let err = Roster::new(vec![
            student("R1", "A", Gender::Male),
            student("R1", "B", Gender::Female),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "validation_failed");
    }

    #[test]
    fn numeric_query_returns_first_register_match_only() {
        let roster = sample();
        let hits = roster.search("06");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].register, "927624BEC064");
        assert!(roster.search("999").is_empty());
    }

    #[test]
    fn text_query_matches_name_case_insensitively() {
        let roster = sample();
        let hits: Vec<_> = roster.search("hari").iter().map(|s| s.register.clone()).collect();
        assert_eq!(hits, vec!["927624BEC064", "927624BEC065"]);
        assert_eq!(roster.search("bec070").len(), 1);
        assert_eq!(roster.search("   ").len(), 3);
    }

    #[test]
    fn counts_split_by_gender() {
        let c = sample().counts();
        assert_eq!((c.total, c.boys, c.girls), (3, 2, 1));
    }
}
