mod ipc;

use chrono::{DateTime, Utc};
use classhubd::reset;
use classhubd::sync::SyncUpdate;
use serde_json::json;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

enum Step {
    Line(String),
    Eof,
    Push(SyncUpdate),
    AutoReset,
}

fn init_tracing() {
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("CLASSHUB_LOG").unwrap_or_else(|_| "info".into()))
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();
}

fn emit(stdout: &mut io::Stdout, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

async fn next_push(state: &mut ipc::AppState) -> SyncUpdate {
    if let Some(session) = state.session.as_mut() {
        if session.coordinator.has_subscriptions() {
            if let Some(update) = session.coordinator.next_update().await {
                return update;
            }
        }
    }
    std::future::pending().await
}

async fn sleep_until(at: Option<DateTime<Utc>>) {
    let Some(at) = at else {
        return std::future::pending().await;
    };
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

async fn run_auto_reset(state: &mut ipc::AppState) -> Option<serde_json::Value> {
    let session = state.session.as_mut()?;
    let now = Utc::now();
    let outcome = reset::run_daily_reset(&mut session.coordinator, now).await;
    session.next_auto_reset = Some(now + reset::reset_interval());
    let data = match outcome {
        Ok(cleared) => json!({
            "cleared": cleared.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "nextAutoReset": session.next_auto_reset.map(|t| t.to_rfc3339()),
        }),
        Err(e) => {
            warn!(error = %e, "scheduled reset incomplete");
            json!({
                "error": { "code": e.code(), "message": e.to_string() },
                "nextAutoReset": session.next_auto_reset.map(|t| t.to_rfc3339()),
            })
        }
    };
    Some(data)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "classhubd starting");

    let mut state = ipc::AppState::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        let reset_at = state.next_auto_reset();
        let step = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(v)) => Step::Line(v),
                Ok(None) => Step::Eof,
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    Step::Eof
                }
            },
            update = next_push(&mut state) => Step::Push(update),
            _ = sleep_until(reset_at) => Step::AutoReset,
        };

        match step {
            Step::Eof => break,
            Step::Push(update) => {
                let event = format!("{}.snapshot", update.kind);
                emit(&mut stdout, &ipc::event(&event, json!(update.snapshot)));
            }
            Step::AutoReset => {
                if let Some(data) = run_auto_reset(&mut state).await {
                    emit(&mut stdout, &ipc::event("data.autoReset", data));
                }
            }
            Step::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let req: ipc::Request = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        // Can't reply without id.
                        emit(
                            &mut stdout,
                            &json!({
                                "ok": false,
                                "error": { "code": "bad_json", "message": e.to_string() },
                            }),
                        );
                        continue;
                    }
                };
                let resp = ipc::handle_request(&mut state, req).await;
                emit(&mut stdout, &resp);
            }
        }
    }

    info!("stdin closed; shutting down");
}
