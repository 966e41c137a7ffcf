pub mod analytics;
pub mod auth;
pub mod core;
pub mod data;
pub mod polls;
pub mod roster;
pub mod submissions;
pub mod view;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use classhubd::session::Session;
use classhubd::sync::{Durability, Mutation};

pub(crate) fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub(crate) fn session<'a>(state: &'a AppState, req: &Request) -> Result<&'a Session, serde_json::Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub(crate) fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut Session, serde_json::Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Whether the caller asked to wait for the remote push. Off by default so a
/// slow backend never stalls the request loop.
pub(crate) fn await_remote(req: &Request) -> Result<bool, serde_json::Value> {
    match req.params.get("awaitRemote") {
        None => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| err(&req.id, "bad_params", "awaitRemote must be a boolean", None)),
    }
}

/// Settles the push when awaited; otherwise it runs on detached.
pub(crate) async fn durability_of(mutation: Mutation, await_remote: bool) -> Option<Durability> {
    if await_remote {
        Some(mutation.settle().await.durability())
    } else {
        None
    }
}
