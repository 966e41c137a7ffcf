use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::db::SqliteStore;
use crate::remote;
use crate::reset::next_reset_at;
use crate::roster::{Roster, RosterSource};
use crate::sync::SyncCoordinator;

/// Everything tied to one selected workspace.
pub struct Session {
    pub workspace: PathBuf,
    pub config: Config,
    pub roster: Roster,
    pub roster_source: RosterSource,
    pub coordinator: SyncCoordinator,
    pub next_auto_reset: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("failed to read workspace config: {0:#}")]
    Config(anyhow::Error),
    #[error("failed to open local cache: {0:#}")]
    Database(anyhow::Error),
    #[error("failed to load roster: {0:#}")]
    Roster(anyhow::Error),
}

impl OpenError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_invalid",
            Self::Database(_) => "db_open_failed",
            Self::Roster(_) => "roster_invalid",
        }
    }
}

impl Session {
    pub async fn open(workspace: &Path, now: DateTime<Utc>) -> Result<Self, OpenError> {
        let config = Config::load(workspace).map_err(OpenError::Config)?;
        let store = SqliteStore::open(workspace)
            .with_context(|| format!("workspace {}", workspace.display()))
            .map_err(OpenError::Database)?;
        let remote = remote::connect(&config.remote);
        let (roster, roster_source) = Roster::load(&config.roster_file, remote.as_deref())
            .await
            .map_err(OpenError::Roster)?;

        let mut coordinator = SyncCoordinator::new(Box::new(store), remote);
        let next_auto_reset = config
            .auto_reset
            .then(|| next_reset_at(coordinator.store_mut(), now));

        info!(
            workspace = %workspace.display(),
            students = roster.len(),
            remote = coordinator.remote_name().unwrap_or("none"),
            auto_reset = config.auto_reset,
            "workspace opened"
        );
        Ok(Self {
            workspace: workspace.to_path_buf(),
            config,
            roster,
            roster_source,
            coordinator,
            next_auto_reset,
        })
    }
}
