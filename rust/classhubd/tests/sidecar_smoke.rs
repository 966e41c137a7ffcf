use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn write_workspace(dir: &Path) {
    let roster = json!([
        { "register": "R1", "name": "Arun", "gender": "male" },
        { "register": "R2", "name": "Bhavya", "gender": "female" },
        { "register": "R3", "name": "Charan", "gender": "male" }
    ]);
    std::fs::write(dir.join("roster.json"), roster.to_string()).expect("write roster");
    let config = format!(
        "access_code_sha256 = \"{}\"\nremote = {{ kind = \"memory\" }}\n",
        classhubd::auth::sha256_hex("927624")
    );
    std::fs::write(dir.join("classhub.toml"), config).expect("write config");
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classhubd");
    let mut child = Command::new(exe)
        .env_remove("CLASSHUB_REMOTE_PATH")
        .env_remove("CLASSHUB_ACCESS_CODE_SHA256")
        .env_remove("CLASSHUB_AUTO_RESET")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classhubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_json(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read line");
    assert!(!line.trim().is_empty(), "sidecar closed stdout");
    serde_json::from_str(line.trim()).expect("parse line json")
}

/// Sends one request and returns its response, collecting any pushed events
/// that arrive first.
fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    events: &mut Vec<serde_json::Value>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    loop {
        let value = read_json(reader);
        if value.get("event").is_some() {
            events.push(value);
            continue;
        }
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        return value;
    }
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    events: &mut Vec<serde_json::Value>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, events, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn sidecar_tracks_submissions_polls_and_access() {
    let workspace = temp_dir("classhub-sidecar-smoke");
    write_workspace(&workspace);
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let mut events = Vec::new();

    let health = request_ok(&mut stdin, &mut reader, &mut events, "1", "health", json!({}));
    assert!(health.get("workspacePath").is_some_and(|v| v.is_null()));

    let early = request(&mut stdin, &mut reader, &mut events, "2", "roster.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["roster"]["source"], json!("file"));
    assert_eq!(selected["roster"]["count"], json!(3));
    assert_eq!(selected["remote"], json!("memory"));

    let roster = request_ok(&mut stdin, &mut reader, &mut events, "4", "roster.list", json!({}));
    assert_eq!(roster["students"].as_array().map(|a| a.len()), Some(3));

    let toggled = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "5",
        "submissions.toggle",
        json!({ "register": "R1" }),
    );
    assert_eq!(toggled["record"]["submitted"], json!(true));
    assert!(toggled["record"]["timestamp"].is_string());
    assert!(toggled["durability"].is_null(), "remote push not awaited by default");

    let awaited = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "5b",
        "submissions.toggle",
        json!({ "register": "R1", "submitted": true, "awaitRemote": true }),
    );
    assert_eq!(awaited["durability"], json!("persistedLocallyAndRemotely"));

    let unknown = request(
        &mut stdin,
        &mut reader,
        &mut events,
        "6",
        "submissions.toggle",
        json!({ "register": "R9" }),
    );
    assert_eq!(error_code(&unknown), Some("validation_failed"));

    let boys = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "7",
        "view.get",
        json!({ "gender": "male" }),
    );
    let registers: Vec<&str> = boys["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["register"].as_str())
        .collect();
    assert_eq!(registers, vec!["R1", "R3"]);
    assert_eq!(boys["stats"]["submitted"], json!(1));
    assert_eq!(boys["stats"]["submissionRate"], json!(50));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "8",
        "polls.create",
        json!({ "question": "Lab on Friday?" }),
    );
    assert!(created["durability"].is_null());
    let poll_id = created["poll"]["id"].as_str().expect("poll id").to_string();
    assert!(poll_id.starts_with("poll_"));

    for (id, register, answer) in [("9", "R1", "Yes"), ("10", "R2", "No")] {
        let answered = request_ok(
            &mut stdin,
            &mut reader,
            &mut events,
            id,
            "polls.respond",
            json!({ "pollId": poll_id, "register": register, "response": answer, "awaitRemote": true }),
        );
        assert_eq!(answered["durability"], json!("persistedLocallyAndRemotely"));
    }
    let bad_flag = request(
        &mut stdin,
        &mut reader,
        &mut events,
        "10b",
        "polls.respond",
        json!({ "pollId": poll_id, "register": "R3", "response": "Yes", "awaitRemote": "yes" }),
    );
    assert_eq!(error_code(&bad_flag), Some("bad_params"));
    let results = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "11",
        "polls.results",
        json!({ "pollId": poll_id }),
    );
    assert_eq!(results["yesCount"], json!(1));
    assert_eq!(results["noCount"], json!(1));
    assert_eq!(results["pending"][0]["register"], json!("R3"));

    let denied = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "12",
        "auth.verify",
        json!({ "code": "111111" }),
    );
    assert_eq!(denied["access"], json!("denied"));
    let granted = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "13",
        "auth.verify",
        json!({ "code": "927624" }),
    );
    assert_eq!(granted["access"], json!("granted"));
    let short = request(
        &mut stdin,
        &mut reader,
        &mut events,
        "14",
        "auth.verify",
        json!({ "code": "123" }),
    );
    assert_eq!(error_code(&short), Some("validation_failed"));

    let summary = request_ok(&mut stdin, &mut reader, &mut events, "15", "analytics.summary", json!({}));
    assert_eq!(summary["totalStudents"], json!(3));
    assert_eq!(summary["submittedCount"], json!(1));
    assert_eq!(summary["totalPolls"], json!(1));

    let reset = request_ok(&mut stdin, &mut reader, &mut events, "16", "data.resetAll", json!({}));
    assert_eq!(reset["cleared"], json!(["submissions", "pollResponses"]));
    let after = request_ok(&mut stdin, &mut reader, &mut events, "17", "view.stats", json!({}));
    assert_eq!(after["submitted"], json!(0));

    let missing = request(&mut stdin, &mut reader, &mut events, "18", "grades.compute", json!({}));
    assert_eq!(error_code(&missing), Some("not_implemented"));

    let _ = std::fs::remove_dir_all(&workspace);
}

#[test]
fn subscribed_sidecar_pushes_snapshot_events() {
    let workspace = temp_dir("classhub-sidecar-events");
    write_workspace(&workspace);
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let mut events = Vec::new();

    request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sub = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "2",
        "submissions.subscribe",
        json!({}),
    );
    assert_eq!(sub["subscription"], json!("active"));
    let again = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "3",
        "submissions.subscribe",
        json!({}),
    );
    assert_eq!(again["subscription"], json!("alreadyActive"));

    request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "4",
        "submissions.toggle",
        json!({ "register": "R2", "submitted": true }),
    );

    // The remote echoes the write back as a full snapshot.
    let mut saw_r2 = events.iter().any(|e| e["data"]["R2"]["submitted"] == json!(true));
    while !saw_r2 {
        let value = read_json(&mut reader);
        assert_eq!(value["event"], json!("submissions.snapshot"));
        saw_r2 = value["data"]["R2"]["submitted"] == json!(true);
    }

    let off = request_ok(
        &mut stdin,
        &mut reader,
        &mut events,
        "5",
        "submissions.unsubscribe",
        json!({}),
    );
    assert_eq!(off["wasActive"], json!(true));
    let health = request_ok(&mut stdin, &mut reader, &mut events, "6", "health", json!({}));
    assert_eq!(health["subscriptions"], json!([]));

    let _ = std::fs::remove_dir_all(&workspace);
}
