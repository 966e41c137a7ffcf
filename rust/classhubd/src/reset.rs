use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::EntityKind;
use crate::store::LocalStore;
use crate::sync::SyncCoordinator;

pub const LAST_RESET_KEY: &str = "lastResetTime";

/// Kinds cleared by the daily reset and by a manual reset with no kinds
/// given. Polls themselves survive.
pub const DAILY_RESET_KINDS: [EntityKind; 2] = [EntityKind::Submissions, EntityKind::PollResponses];

pub fn reset_interval() -> Duration {
    Duration::hours(24)
}

pub fn last_reset(store: &dyn LocalStore) -> Option<DateTime<Utc>> {
    let raw = store.get(LAST_RESET_KEY)?;
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %raw, error = %e, "ignoring unreadable lastResetTime");
            None
        }
    }
}

pub fn record_reset(store: &mut dyn LocalStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    store.set(LAST_RESET_KEY, &now.to_rfc3339())
}

/// 24 hours after the last reset. With no stamp, or one whose moment has
/// already passed, the cycle restarts from `now` and the stamp is rewritten.
pub fn next_reset_at(store: &mut dyn LocalStore, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(last) = last_reset(store) {
        let next = last + reset_interval();
        if next > now {
            return next;
        }
    }
    if let Err(e) = record_reset(store, now) {
        warn!(error = %e, "could not store lastResetTime");
    }
    now + reset_interval()
}

/// Clears the daily kinds and stamps `lastResetTime`. The stamp is written
/// even when the reset was partial so the next attempt is a full day away.
pub async fn run_daily_reset(
    coordinator: &mut SyncCoordinator,
    now: DateTime<Utc>,
) -> Result<Vec<EntityKind>, SyncError> {
    info!("running scheduled reset");
    let result = coordinator.reset_all(&DAILY_RESET_KINDS).await;
    if let Err(e) = record_reset(coordinator.store_mut(), now) {
        warn!(error = %e, "could not store lastResetTime");
    }
    result
}
