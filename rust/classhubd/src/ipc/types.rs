use std::path::PathBuf;

use chrono::{DateTime, Utc};
use classhubd::session::Session;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub session: Option<Session>,
}

impl AppState {
    pub fn next_auto_reset(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().and_then(|s| s.next_auto_reset)
    }
}
