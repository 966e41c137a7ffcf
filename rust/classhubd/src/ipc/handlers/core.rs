use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use classhubd::model::EntityKind;
use classhubd::session::Session;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = state.session.as_ref();
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "remote": session.and_then(|s| s.coordinator.remote_name()),
            "subscriptions": session
                .map(|s| {
                    EntityKind::ALL
                        .iter()
                        .filter(|k| s.coordinator.is_subscribed(**k))
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        }),
    )
}

async fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Tear down the previous workspace's subscriptions before opening.
    state.session = None;
    state.workspace = None;

    match Session::open(&path, Utc::now()).await {
        Ok(session) => {
            let result = json!({
                "workspacePath": path.to_string_lossy(),
                "roster": {
                    "source": session.roster_source,
                    "count": session.roster.len(),
                },
                "remote": session.coordinator.remote_name(),
                "autoReset": session.config.auto_reset,
                "nextAutoReset": session.next_auto_reset.map(|t| t.to_rfc3339()),
            });
            state.workspace = Some(path);
            state.session = Some(session);
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req).await),
        _ => None,
    }
}
