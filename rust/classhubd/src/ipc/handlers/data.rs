use super::session_mut;
use crate::ipc::error::{err, ok, sync_err};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use classhubd::model::EntityKind;
use classhubd::reset::{self, DAILY_RESET_KINDS};
use serde_json::json;
use tracing::warn;

fn parse_kinds(req: &Request) -> Result<Vec<EntityKind>, serde_json::Value> {
    let Some(raw) = req.params.get("kinds") else {
        return Ok(DAILY_RESET_KINDS.to_vec());
    };
    let Some(items) = raw.as_array() else {
        return Err(err(&req.id, "bad_params", "kinds must be an array", None));
    };
    let mut out = Vec::new();
    for v in items {
        let Some(kind) = v.as_str().and_then(EntityKind::parse) else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("unknown entity kind: {}", v),
                None,
            ));
        };
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    if out.is_empty() {
        return Err(err(&req.id, "bad_params", "kinds must not be empty", None));
    }
    Ok(out)
}

async fn handle_reset_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kinds = match parse_kinds(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match s.coordinator.reset_all(&kinds).await {
        Ok(cleared) => {
            let now = Utc::now();
            if let Err(e) = reset::record_reset(s.coordinator.store_mut(), now) {
                warn!(error = %e, "could not store lastResetTime");
            }
            if s.config.auto_reset {
                s.next_auto_reset = Some(now + reset::reset_interval());
            }
            ok(
                &req.id,
                json!({
                    "cleared": cleared.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
                }),
            )
        }
        Err(e) => sync_err(&req.id, &e),
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "data.resetAll" => Some(handle_reset_all(state, req).await),
        _ => None,
    }
}
