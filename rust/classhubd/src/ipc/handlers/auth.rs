use super::{required_str, session};
use crate::ipc::error::{ok, sync_err};
use crate::ipc::types::{AppState, Request};
use classhubd::auth::verify_access_code;
use serde_json::json;
use tracing::info;

fn handle_verify(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match verify_access_code(&code, s.config.access_code_sha256.as_deref()) {
        Ok(access) => {
            info!(?access, "access code checked");
            ok(&req.id, json!({ "access": access }))
        }
        Err(e) => sync_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.verify" => Some(handle_verify(state, req)),
        _ => None,
    }
}
