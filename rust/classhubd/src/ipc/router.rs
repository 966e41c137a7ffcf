use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub async fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::roster::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::submissions::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::view::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::polls::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::analytics::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::data::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
