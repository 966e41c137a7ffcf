use super::{required_str, session};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_list(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "students": s.roster.students(),
            "counts": s.roster.counts(),
        }),
    )
}

fn handle_search(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let query = match required_str(req, "query") {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "students": s.roster.search(&query) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.list" => Some(handle_list(state, req)),
        "roster.search" => Some(handle_search(state, req)),
        _ => None,
    }
}
