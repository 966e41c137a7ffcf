use super::{session, session_mut};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use classhubd::model::{Student, SubmissionRecord};
use classhubd::view::{self, GenderFilter, SortKey, SubmissionFilter, ViewPrefs};
use serde_json::json;
use std::collections::BTreeMap;

/// Stored preferences overridden by any `gender`, `submission` or `sortBy`
/// present in the request.
pub(crate) fn prefs_from_params(base: ViewPrefs, req: &Request) -> Result<ViewPrefs, serde_json::Value> {
    let mut prefs = base;
    if let Some(raw) = req.params.get("gender").and_then(|v| v.as_str()) {
        prefs.gender = GenderFilter::parse(raw)
            .ok_or_else(|| err(&req.id, "bad_params", format!("unknown gender filter: {}", raw), None))?;
    }
    if let Some(raw) = req.params.get("submission").and_then(|v| v.as_str()) {
        prefs.submission = SubmissionFilter::parse(raw).ok_or_else(|| {
            err(&req.id, "bad_params", format!("unknown submission filter: {}", raw), None)
        })?;
    }
    if let Some(raw) = req.params.get("sortBy").and_then(|v| v.as_str()) {
        prefs.sort_by = SortKey::parse(raw)
            .ok_or_else(|| err(&req.id, "bad_params", format!("unknown sort key: {}", raw), None))?;
    }
    Ok(prefs)
}

pub(crate) fn student_rows(
    list: &[&Student],
    submissions: &BTreeMap<String, SubmissionRecord>,
) -> Vec<serde_json::Value> {
    list.iter()
        .map(|s| {
            let record = submissions.get(&s.register);
            json!({
                "register": s.register,
                "name": s.name,
                "gender": s.gender,
                "submitted": record.is_some_and(|r| r.submitted()),
                "timestamp": record.and_then(|r| r.timestamp()).map(|t| t.to_rfc3339()),
            })
        })
        .collect()
}

fn handle_get(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let prefs = match prefs_from_params(ViewPrefs::load(s.coordinator.store()), req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subs = s.coordinator.submissions();
    let list = view::derive(s.roster.students(), subs, &prefs);
    ok(
        &req.id,
        json!({
            "filters": prefs,
            "students": student_rows(&list, subs),
            "stats": view::filtered_stats(&list, subs),
        }),
    )
}

fn handle_set_filters(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let prefs = match prefs_from_params(ViewPrefs::load(s.coordinator.store()), req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = prefs.save(s.coordinator.store_mut()) {
        return err(&req.id, "local_persistence_failed", format!("{e:#}"), None);
    }
    ok(&req.id, json!({ "filters": prefs }))
}

fn handle_reset_filters(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let prefs = ViewPrefs::reset(s.coordinator.store_mut());
    ok(&req.id, json!({ "filters": prefs }))
}

fn handle_stats(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let prefs = ViewPrefs::load(s.coordinator.store());
    let subs = s.coordinator.submissions();
    let list = view::derive(s.roster.students(), subs, &prefs);
    ok(&req.id, json!(view::filtered_stats(&list, subs)))
}

fn handle_export_csv(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let prefs = ViewPrefs::load(s.coordinator.store());
    let subs = s.coordinator.submissions();
    let list = view::derive(s.roster.students(), subs, &prefs);
    ok(
        &req.id,
        json!({
            "csv": view::export_csv(&list, subs),
            "rows": list.len(),
        }),
    )
}

fn handle_recent(state: &AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let hours = match req.params.get("hours") {
        None => 24,
        Some(v) => match v.as_i64() {
            Some(h) if h > 0 => h,
            _ => return err(&req.id, "bad_params", "hours must be a positive integer", None),
        },
    };
    let prefs = ViewPrefs::load(s.coordinator.store());
    let subs = s.coordinator.submissions();
    let list = view::derive(s.roster.students(), subs, &prefs);
    let recent = view::recent(&list, subs, hours, Utc::now());
    ok(
        &req.id,
        json!({
            "hours": hours,
            "students": student_rows(&recent, subs),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "view.get" => Some(handle_get(state, req)),
        "view.setFilters" => Some(handle_set_filters(state, req)),
        "view.resetFilters" => Some(handle_reset_filters(state, req)),
        "view.stats" => Some(handle_stats(state, req)),
        "view.exportCsv" => Some(handle_export_csv(state, req)),
        "view.recent" => Some(handle_recent(state, req)),
        _ => None,
    }
}
