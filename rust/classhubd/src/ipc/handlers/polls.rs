use super::{await_remote, durability_of, required_str, session, session_mut};
use crate::ipc::error::{err, ok, sync_err};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use classhubd::model::{EntityKind, PollAnswer};
use classhubd::polls;
use classhubd::session::Session;
use serde_json::json;
use std::collections::BTreeMap;

fn answers_for(s: &Session, poll_id: &str) -> Option<BTreeMap<String, PollAnswer>> {
    let poll = s.coordinator.poll(poll_id)?;
    Some(polls::effective_responses(poll, s.coordinator.poll_responses().values()))
}

async fn handle_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let polls = s.coordinator.load(EntityKind::Polls).await;
    let responses = s.coordinator.load(EntityKind::PollResponses).await;
    ok(
        &req.id,
        json!({
            "polls": polls,
            "responseRecords": responses.len(),
        }),
    )
}

async fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let question = match required_str(req, "question") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let wait = match await_remote(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match s.coordinator.create_poll(&question, Utc::now()) {
        Ok((poll, mutation)) => {
            let durability = durability_of(mutation, wait).await;
            ok(&req.id, json!({ "poll": poll, "durability": durability }))
        }
        Err(e) => sync_err(&req.id, &e),
    }
}

async fn handle_respond(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let poll_id = match required_str(req, "pollId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let register = match required_str(req, "register") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw = match required_str(req, "response") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(answer) = PollAnswer::parse(&raw) else {
        return err(&req.id, "bad_params", "response must be Yes or No", None);
    };
    if !s.roster.contains(&register) {
        return err(
            &req.id,
            "validation_failed",
            format!("unknown register: {}", register),
            None,
        );
    }
    let wait = match await_remote(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mutation = match s.coordinator.respond(&poll_id, &register, answer, Utc::now()) {
        Ok(v) => v,
        Err(e) => return sync_err(&req.id, &e),
    };
    let durability = durability_of(mutation, wait).await;
    ok(
        &req.id,
        json!({
            "pollId": poll_id,
            "register": register,
            "response": answer,
            "durability": durability,
        }),
    )
}

async fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let poll_id = match required_str(req, "pollId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match s.coordinator.delete_poll(&poll_id).await {
        Ok(deletion) => ok(&req.id, json!(deletion)),
        Err(e) => sync_err(&req.id, &e),
    }
}

fn handle_results(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let poll_id = match required_str(req, "pollId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (Some(poll), Some(answers)) = (s.coordinator.poll(&poll_id), answers_for(s, &poll_id)) else {
        return err(&req.id, "validation_failed", format!("unknown poll: {}", poll_id), None);
    };
    ok(&req.id, json!(polls::results(poll, &answers, s.roster.students())))
}

fn handle_export_csv(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let poll_id = match required_str(req, "pollId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(answers) = answers_for(s, &poll_id) else {
        return err(&req.id, "validation_failed", format!("unknown poll: {}", poll_id), None);
    };
    ok(
        &req.id,
        json!({ "csv": polls::export_csv(&answers, s.roster.students()) }),
    )
}

async fn handle_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let outcome = s.coordinator.subscribe(EntityKind::Polls, None).await;
    ok(&req.id, json!({ "subscription": outcome }))
}

fn handle_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let was_active = s.coordinator.unsubscribe(EntityKind::Polls);
    ok(&req.id, json!({ "wasActive": was_active }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "polls.load" => Some(handle_load(state, req).await),
        "polls.create" => Some(handle_create(state, req).await),
        "polls.respond" => Some(handle_respond(state, req).await),
        "polls.delete" => Some(handle_delete(state, req).await),
        "polls.results" => Some(handle_results(state, req)),
        "polls.exportCsv" => Some(handle_export_csv(state, req)),
        "polls.subscribe" => Some(handle_subscribe(state, req).await),
        "polls.unsubscribe" => Some(handle_unsubscribe(state, req)),
        _ => None,
    }
}
