use super::view::{prefs_from_params, student_rows};
use super::{await_remote, durability_of, required_str, session_mut};
use crate::ipc::error::{err, ok, sync_err};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use classhubd::model::EntityKind;
use classhubd::view::{self, ViewPrefs};
use serde_json::json;

async fn handle_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = s.coordinator.load(EntityKind::Submissions).await;
    ok(
        &req.id,
        json!({
            "count": snapshot.len(),
            "submissions": snapshot,
        }),
    )
}

async fn handle_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let register = match required_str(req, "register") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !s.roster.contains(&register) {
        return err(
            &req.id,
            "validation_failed",
            format!("unknown register: {}", register),
            None,
        );
    }
    let submitted = match req.params.get("submitted") {
        None => !s
            .coordinator
            .submissions()
            .get(&register)
            .is_some_and(|r| r.submitted()),
        Some(v) => match v.as_bool() {
            Some(b) => b,
            None => return err(&req.id, "bad_params", "submitted must be a boolean", None),
        },
    };
    let wait = match await_remote(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mutation = match s.coordinator.set_submitted(&register, submitted, Utc::now()) {
        Ok(m) => m,
        Err(e) => return sync_err(&req.id, &e),
    };
    let record = s.coordinator.submissions().get(&register).cloned();
    let durability = durability_of(mutation, wait).await;
    ok(
        &req.id,
        json!({
            "record": record,
            "durability": durability,
        }),
    )
}

/// Applies `submitted` to every student in the current filtered view.
async fn handle_bulk(state: &mut AppState, req: &Request, submitted: bool) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let prefs = match prefs_from_params(ViewPrefs::load(s.coordinator.store()), req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let registers: Vec<String> = view::derive(s.roster.students(), s.coordinator.submissions(), &prefs)
        .into_iter()
        .map(|st| st.register.clone())
        .collect();
    if registers.is_empty() {
        return ok(&req.id, json!({ "attempted": 0, "applied": 0, "remoteConfirmed": 0, "remoteFailed": 0 }));
    }
    match s
        .coordinator
        .set_submitted_many(&registers, submitted, Utc::now())
        .await
    {
        Ok(outcome) => match outcome.check() {
            Ok(()) => ok(&req.id, json!(outcome)),
            Err(e) => err(&req.id, e.code(), e.to_string(), Some(json!(outcome))),
        },
        Err(e) => sync_err(&req.id, &e),
    }
}

async fn handle_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let outcome = s.coordinator.subscribe(EntityKind::Submissions, None).await;
    ok(&req.id, json!({ "subscription": outcome }))
}

fn handle_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let was_active = s.coordinator.unsubscribe(EntityKind::Submissions);
    ok(&req.id, json!({ "wasActive": was_active }))
}

fn handle_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subs = s.coordinator.submissions();
    let prefs = ViewPrefs {
        submission: view::SubmissionFilter::Pending,
        ..ViewPrefs::default()
    };
    let list = view::derive(s.roster.students(), subs, &prefs);
    ok(&req.id, json!({ "students": student_rows(&list, subs) }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.load" => Some(handle_load(state, req).await),
        "submissions.toggle" => Some(handle_toggle(state, req).await),
        "submissions.markAllFiltered" => Some(handle_bulk(state, req, true).await),
        "submissions.clearAllFiltered" => Some(handle_bulk(state, req, false).await),
        "submissions.subscribe" => Some(handle_subscribe(state, req).await),
        "submissions.unsubscribe" => Some(handle_unsubscribe(state, req)),
        "submissions.pending" => Some(handle_pending(state, req)),
        _ => None,
    }
}
