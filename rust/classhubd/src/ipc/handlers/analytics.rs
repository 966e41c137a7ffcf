use super::session;
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use classhubd::analytics;
use classhubd::session::Session;
use serde_json::json;

fn with_session(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Session) -> serde_json::Value,
) -> serde_json::Value {
    match session(state, req) {
        Ok(s) => ok(&req.id, f(s)),
        Err(e) => e,
    }
}

fn summary(s: &Session) -> analytics::Summary {
    analytics::summary(
        s.roster.students(),
        s.coordinator.submissions(),
        s.coordinator.polls(),
        s.coordinator.poll_responses(),
        Utc::now(),
    )
}

fn detailed(s: &Session) -> analytics::Detailed {
    analytics::detailed(
        s.roster.students(),
        s.coordinator.submissions(),
        s.coordinator.polls(),
        s.coordinator.poll_responses(),
        Utc::now(),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "analytics.summary" => with_session(state, req, |s| json!(summary(s))),
        "analytics.detailed" => with_session(state, req, |s| json!(detailed(s))),
        "analytics.genderComparison" => {
            with_session(state, req, |s| json!(analytics::gender_comparison(&summary(s))))
        }
        "analytics.trend" => with_session(state, req, |s| {
            json!(analytics::trend(s.coordinator.submissions(), Utc::now()))
        }),
        "analytics.report" => with_session(state, req, |s| {
            json!({ "report": analytics::report(&detailed(s), Utc::now()) })
        }),
        _ => return None,
    };
    Some(resp)
}
